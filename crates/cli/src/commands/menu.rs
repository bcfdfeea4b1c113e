use menuguard_agent::bootstrap::load_menu;
use menuguard_core::config::LoadOptions;
use menuguard_core::domain::menu::{MenuCatalog, MenuItem};
use menuguard_core::validation::price::format_price;
use serde::Serialize;

use crate::commands::{prepare, to_json, CommandResult, EXIT_BOOTSTRAP};

#[derive(Debug, Serialize)]
struct MenuReport<'a> {
    command: &'static str,
    status: &'static str,
    source: String,
    items: &'a [MenuItem],
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let config = match prepare("menu", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let menu = match load_menu(&config.menu) {
        Ok(menu) => menu,
        Err(error) => {
            return CommandResult::failure("menu", "menu_load", error.to_string(), EXIT_BOOTSTRAP)
        }
    };
    let source = config
        .menu
        .path
        .as_ref()
        .map_or_else(|| "sample".to_string(), |path| path.display().to_string());

    if json_output {
        let report = MenuReport { command: "menu", status: "ok", source, items: menu.items() };
        return CommandResult::raw(0, to_json("menu", &report));
    }

    CommandResult::raw(0, render_human(&menu, &source))
}

fn render_human(menu: &MenuCatalog, source: &str) -> String {
    let mut lines = vec![format!("menu ({} items, source: {source}):", menu.len())];
    let mut category = "";
    for item in menu.items() {
        if item.category != category {
            category = item.category.as_str();
            lines.push(format!("[{category}]"));
        }
        let allergens = if item.allergens.is_empty() {
            "no listed allergens".to_string()
        } else {
            item.allergens.iter().map(|allergen| allergen.as_str()).collect::<Vec<_>>().join(", ")
        };
        lines.push(format!("- {} ${} ({allergens})", item.name, format_price(item.price)));
    }
    lines.join("\n")
}
