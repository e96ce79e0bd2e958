// Copyright 2023 Remi Bernotavicius

fn main() {
    // migrations are embedded into the binary
    println!("cargo:rerun-if-changed=migrations/");
}
