// Copyright 2023 Remi Bernotavicius

use clap::Parser;
use clap::Subcommand;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

mod api;
mod database;
mod shopping_list;
mod store;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug)]
#[command(about = "Foodgram recipe sharing backend")]
struct Args {
    /// SQLite database file, created if missing.
    #[arg(long, global = true, env = "FOODGRAM_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "FOODGRAM_ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
        address: IpAddr,
        #[arg(long, env = "FOODGRAM_PORT", default_value_t = 8000)]
        port: u16,
        /// Page size when a listing doesn't ask for one.
        #[arg(long, default_value_t = 6)]
        page_size: i64,
    },
    CreateUser {
        email: String,
        username: String,
        first_name: String,
        last_name: String,
        #[arg(long, env = "FOODGRAM_PASSWORD")]
        password: String,
        #[arg(long)]
        admin: bool,
    },
    AddTag {
        name: String,
        /// `#RRGGBB`
        color: String,
        slug: String,
    },
    AddIngredient {
        name: String,
        measurement_unit: String,
    },
}

/// This is where the database lives by default. On Linux it should be like:
/// `~/.local/share/foodgram/`
fn data_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().ok_or("failed to get user home directory")?;
    let path = dirs.data_dir().join("foodgram");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

fn serve(conn: database::Connection, address: SocketAddr, page_size: i64) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let state = api::AppState::new(conn, page_size);
    runtime.block_on(api::serve(state, address))?;
    Ok(())
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let args = Args::parse();
    let database_path = match args.database {
        Some(path) => path,
        None => data_path()?.join("data.sqlite"),
    };
    log::info!("using database {}", database_path.display());
    let mut conn = database::establish_connection(database_path)?;

    match args.commands {
        Commands::Serve {
            address,
            port,
            page_size,
        } => serve(conn, SocketAddr::new(address, port), page_size)?,
        Commands::CreateUser {
            email,
            username,
            first_name,
            last_name,
            password,
            admin,
        } => {
            let user = store::users::create_user(
                &mut conn,
                store::users::NewUser {
                    email,
                    username,
                    first_name,
                    last_name,
                    password,
                    is_admin: admin,
                },
            )?;
            println!("created user {} ({})", user.username, user.id);
        }
        Commands::AddTag { name, color, slug } => {
            let tag = store::catalog::create_tag(&mut conn, &name, &color, &slug)?;
            println!("created tag {} ({})", tag.slug, tag.id);
        }
        Commands::AddIngredient {
            name,
            measurement_unit,
        } => {
            let ingredient = store::catalog::create_ingredient(&mut conn, &name, &measurement_unit)?;
            println!("created ingredient {} ({})", ingredient.name, ingredient.id);
        }
    }
    Ok(())
}
