use anyhow::{Context, Result};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use trellis_core::Engine;

/// List modules of an organisation, or revisions of one module.
pub fn list(engine: &Engine, organisation: &str, module: Option<&str>, resolver: Option<&str>) -> Result<()> {
    let settings = engine.settings();
    let resolver = match resolver {
        Some(name) => settings.resolver(name).with_context(|| format!("unknown resolver '{name}'"))?,
        None => settings.default_resolver().context("no resolver configured")?,
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_content_arrangement(ContentArrangement::Dynamic);

    match module {
        Some(module) => {
            let revisions = resolver.list_revisions(organisation, module)?;
            if revisions.is_empty() {
                println!("  No revisions of {organisation}#{module} in {}.", resolver.name());
                return Ok(());
            }
            table.set_header(vec!["Module", "Revision"]);
            for revision in revisions {
                table.add_row(vec![format!("{organisation}#{module}"), revision]);
            }
        }
        None => {
            let modules = resolver.list_modules(organisation)?;
            if modules.is_empty() {
                println!("  No modules of {organisation} in {}.", resolver.name());
                return Ok(());
            }
            table.set_header(vec!["Organisation", "Module"]);
            for module in modules {
                table.add_row(vec![organisation.to_string(), module]);
            }
        }
    }
    println!("{table}");
    Ok(())
}
