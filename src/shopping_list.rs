// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{RecipeRelation, UserId};
use crate::database::schema::{ingredients, recipe_ingredients, recipe_relations};
use crate::store::Result;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

impl fmt::Display for ShoppingListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "- {} ({}) - {}",
            self.name, self.measurement_unit, self.total_amount
        )
    }
}

/// Sums amounts per (name, unit), biggest totals first.
pub fn aggregate(rows: impl IntoIterator<Item = (String, String, i32)>) -> Vec<ShoppingListItem> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for (name, unit, amount) in rows {
        *totals.entry((name, unit)).or_default() += i64::from(amount);
    }

    let mut items: Vec<_> = totals
        .into_iter()
        .map(|((name, measurement_unit), total_amount)| ShoppingListItem {
            name,
            measurement_unit,
            total_amount,
        })
        .collect();
    items.sort_by(|a, b| {
        b.total_amount
            .cmp(&a.total_amount)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.measurement_unit.cmp(&b.measurement_unit))
    });
    items
}

pub fn build_shopping_list(
    conn: &mut database::Connection,
    user: UserId,
) -> Result<Vec<ShoppingListItem>> {
    let in_cart = recipe_relations::table
        .filter(recipe_relations::user_id.eq(user))
        .filter(recipe_relations::kind.eq(RecipeRelation::ShoppingCart))
        .select(recipe_relations::recipe_id);

    let rows: Vec<(String, String, i32)> = recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(recipe_ingredients::recipe_id.eq_any(in_cart))
        .select((
            ingredients::name,
            ingredients::measurement_unit,
            recipe_ingredients::amount,
        ))
        .load(conn)?;
    Ok(aggregate(rows))
}

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Format {
    #[default]
    Txt,
    Rtf,
}

impl Format {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Txt => "text/plain; charset=utf-8",
            Self::Rtf => "application/rtf",
        }
    }

    pub fn file_name(&self) -> String {
        let extension: &'static str = self.into();
        format!("foodgram_shopping_cart.{extension}")
    }

    pub fn render(&self, username: &str, date: chrono::NaiveDate, items: &[ShoppingListItem]) -> String {
        match self {
            Self::Txt => render_text(username, date, items),
            Self::Rtf => render_rich_text(username, date, items),
        }
    }
}

pub fn render_text(username: &str, date: chrono::NaiveDate, items: &[ShoppingListItem]) -> String {
    let mut text = format!("Shopping list for {username}\n\n");
    text += &format!("Date: {}\n\n", date.format("%Y-%m-%d"));
    if items.is_empty() {
        text += "Your shopping cart is empty.";
    }
    let lines: Vec<_> = items.iter().map(ToString::to_string).collect();
    text += &lines.join("\n");
    text += &format!("\n\nFoodgram ({})\n", date.format("%Y"));
    text
}

/// RTF only reads 7-bit text; everything else goes through `\uN?`.
fn escape_rich_text(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '{' | '}' => {
                escaped.push('\\');
                escaped.push(c);
            }
            c if c.is_ascii() => escaped.push(c),
            c => {
                let mut units = [0; 2];
                for unit in c.encode_utf16(&mut units) {
                    escaped += &format!("\\u{}?", *unit as i16);
                }
            }
        }
    }
    escaped
}

fn rich_text_header() -> String {
    let mut rich_text = String::new();
    rich_text += "{\\rtf1\\ansi\n";
    rich_text +=
        "{\\fonttbl\\f0\\fnil\\fcharset0 HelveticaNeue-Bold;\\f1\\fswiss\\fcharset0 Helvetica;}\n";

    rich_text += "\\pard";
    for i in 1..13 {
        rich_text += &format!("\\tx{}", i * 560);
    }
    rich_text += "\\pardirnatural\\partightenfactor0\n";
    rich_text
}

fn rich_text_heading(username: &str, date: chrono::NaiveDate) -> String {
    let mut rich_text = String::new();
    rich_text += &format!(
        "\\f0\\b\\fs24 \\cf0 Shopping list for {} \\\n",
        escape_rich_text(username)
    );
    rich_text += &date
        .format_with_items(chrono::format::StrftimeItems::new("%e %B %Y\n"))
        .to_string();
    rich_text += "\\f1\\b0 ";
    rich_text
}

pub fn render_rich_text(
    username: &str,
    date: chrono::NaiveDate,
    items: &[ShoppingListItem],
) -> String {
    let mut rich_text = rich_text_header();
    rich_text += &rich_text_heading(username, date);
    rich_text += "\\\n";

    if items.is_empty() {
        rich_text += "\\\nYour shopping cart is empty.";
    }
    for item in items {
        rich_text += &format!(
            "\\\n{}\t{} {}",
            escape_rich_text(&item.name),
            item.total_amount,
            escape_rich_text(&item.measurement_unit)
        );
    }
    rich_text += &format!("\\\n\\\n\\i Foodgram ({})\\i0\n", date.format("%Y"));
    rich_text += "}";
    rich_text
}

#[cfg(test)]
fn item(name: &str, unit: &str, total_amount: i64) -> ShoppingListItem {
    ShoppingListItem {
        name: name.into(),
        measurement_unit: unit.into(),
        total_amount,
    }
}

#[test]
fn aggregate_sums_and_orders() {
    use maplit::btreemap;

    let recipes = btreemap! {
        "A" => vec![("flour", "g", 200), ("eggs", "unit", 2)],
        "B" => vec![("flour", "g", 300), ("eggs", "unit", 1)],
    };
    let rows = recipes
        .values()
        .flatten()
        .map(|(n, u, a)| (n.to_string(), u.to_string(), *a));
    assert_eq!(
        aggregate(rows),
        vec![item("flour", "g", 500), item("eggs", "unit", 3)]
    );
}

#[test]
fn aggregate_groups_by_unit_and_breaks_ties() {
    let rows = [
        ("sugar", "g", 10),
        ("sugar", "tbsp", 2),
        ("butter", "g", 10),
        ("sugar", "g", 5),
        ("apple", "unit", 15),
    ]
    .map(|(n, u, a)| (n.to_string(), u.to_string(), a));
    assert_eq!(
        aggregate(rows),
        vec![
            item("apple", "unit", 15),
            item("sugar", "g", 15),
            item("butter", "g", 10),
            item("sugar", "tbsp", 2),
        ]
    );
    assert_eq!(aggregate(Vec::new()), vec![]);
}

#[test]
fn shopping_list_from_cart() {
    use crate::store::relations::{toggle_add, toggle_remove};
    use crate::store::test_util;

    let mut conn = database::in_memory();
    let alice = test_util::user(&mut conn, "alice");
    let bob = test_util::user(&mut conn, "bob");
    let flour = test_util::ingredient(&mut conn, "flour", "g");
    let eggs = test_util::ingredient(&mut conn, "eggs", "unit");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00");
    let a = test_util::recipe(&mut conn, &bob, "A", &[(&flour, 200), (&eggs, 2)], &[&lunch]);
    let b = test_util::recipe(&mut conn, &bob, "B", &[(&flour, 300), (&eggs, 1)], &[&lunch]);

    assert_eq!(build_shopping_list(&mut conn, alice.id).unwrap(), vec![]);

    let cart = RecipeRelation::ShoppingCart;
    toggle_add(&mut conn, &cart, alice.id, a.id).unwrap();
    assert_eq!(
        build_shopping_list(&mut conn, alice.id).unwrap(),
        vec![item("flour", "g", 200), item("eggs", "unit", 2)]
    );

    toggle_add(&mut conn, &cart, alice.id, b.id).unwrap();
    // favorites don't count
    toggle_add(&mut conn, &RecipeRelation::Favorite, bob.id, a.id).unwrap();
    assert_eq!(
        build_shopping_list(&mut conn, alice.id).unwrap(),
        vec![item("flour", "g", 500), item("eggs", "unit", 3)]
    );
    assert_eq!(build_shopping_list(&mut conn, bob.id).unwrap(), vec![]);

    toggle_remove(&mut conn, &cart, alice.id, a.id).unwrap();
    assert_eq!(
        build_shopping_list(&mut conn, alice.id).unwrap(),
        vec![item("flour", "g", 300), item("eggs", "unit", 1)]
    );
}

#[test]
fn render_formats() {
    let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let items = vec![item("flour", "g", 500), item("eggs", "unit", 3)];

    assert_eq!(
        render_text("alice", date, &items),
        "Shopping list for alice\n\n\
         Date: 2024-05-01\n\n\
         - flour (g) - 500\n\
         - eggs (unit) - 3\n\n\
         Foodgram (2024)\n"
    );
    assert!(render_text("alice", date, &[]).contains("Your shopping cart is empty."));

    let rich_text = render_rich_text("alice", date, &items);
    assert!(rich_text.starts_with("{\\rtf1"));
    assert!(rich_text.ends_with('}'));
    assert!(rich_text.contains("\\\nflour\t500 g"));
    assert!(rich_text.contains("\\\neggs\t3 unit"));
    assert!(rich_text.contains(" 1 May 2024"));
}

#[test]
fn rich_text_escaping() {
    assert_eq!(escape_rich_text("a{b}\\c"), "a\\{b\\}\\\\c");
    assert_eq!(escape_rich_text("мука"), "\\u1084?\\u1091?\\u1082?\\u1072?");
}

#[test]
fn format_parsing() {
    use std::str::FromStr as _;

    assert_eq!(Format::from_str("txt").unwrap(), Format::Txt);
    assert_eq!(Format::from_str("rtf").unwrap(), Format::Rtf);
    assert!(Format::from_str("pdf").is_err());
    assert_eq!(Format::Rtf.file_name(), "foodgram_shopping_cart.rtf");
    assert_eq!(Format::default().content_type(), "text/plain; charset=utf-8");
}
