use super::ui;
use crate::core::config::AppConfig;
use crate::store::Store;
use anyhow::Result;
use comfy_table::Cell;

/// Shows the most recent sync outcome for each configured person.
pub fn run(config: &AppConfig) -> Result<()> {
    let store = Store::open(&config.store_path()?)?;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Person"),
        ui::header_cell("Last sync"),
        ui::header_cell("Status"),
        ui::header_cell("Updated"),
        ui::header_cell("Deleted"),
        ui::header_cell("Converted"),
        ui::header_cell("Message"),
    ]);

    for person in &config.people {
        match store.last_marker(person.user_id)? {
            Some(marker) => {
                table.add_row(vec![
                    Cell::new(&person.name),
                    Cell::new(marker.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                    ui::outcome_cell(marker.success),
                    Cell::new(marker.counts.updates.to_string()),
                    Cell::new(marker.counts.deletes.to_string()),
                    Cell::new(marker.counts.conversions.to_string()),
                    Cell::new(marker.message.as_deref().unwrap_or("")),
                ]);
            }
            None => {
                table.add_row(vec![
                    Cell::new(&person.name),
                    Cell::new(ui::style_text("never synced", ui::StyleType::Subtle)),
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(""),
                    Cell::new(""),
                ]);
            }
        }
    }

    println!("{table}");
    Ok(())
}
