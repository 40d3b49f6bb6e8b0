use super::ui;
use crate::core::aggregate::{self, ExpenseSummary};
use crate::core::config::{AppConfig, Person};
use crate::store::Store;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use comfy_table::Cell;

impl ExpenseSummary {
    pub fn display_as_table(&self, person: &Person) -> String {
        let currency = &person.reporting_currency;

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Group"),
            ui::header_cell("Category"),
            ui::header_cell(&format!("Total ({currency})")),
        ]);

        for group in &self.groups {
            for (ix, category) in group.categories.iter().enumerate() {
                let group_cell = if ix == 0 {
                    Cell::new(&group.group)
                } else {
                    Cell::new("")
                };
                table.add_row(vec![
                    group_cell,
                    Cell::new(&category.name),
                    ui::amount_cell(category.total),
                ]);
            }
            table.add_row(vec![
                Cell::new(""),
                Cell::new(ui::style_text("Group total", ui::StyleType::Subtle)),
                ui::total_amount_cell(group.total),
            ]);
        }

        // Person name at top
        let mut output = format!(
            "Expenses for {}\n\n",
            ui::style_text(&person.name, ui::StyleType::Title)
        );

        // Table in the middle
        output.push_str(&table.to_string());

        // Grand total at bottom
        output.push_str(&format!(
            "\n\nTotal ({}): {}",
            ui::style_text(currency, ui::StyleType::TotalLabel),
            ui::style_text(&format!("{:.2}", self.grand_total), ui::StyleType::TotalValue)
        ));

        output
    }
}

/// Renders the monthly rollup for every configured person. `month` takes
/// "YYYY-MM"; without it the current calendar month is reported.
pub fn run(config: &AppConfig, month: Option<&str>) -> Result<()> {
    let store = Store::open(&config.store_path()?)?;

    let (start, end) = match month {
        Some(month) => {
            let first = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d")
                .with_context(|| format!("Invalid month '{month}', expected YYYY-MM"))?;
            aggregate::month_range(first.year(), first.month())?
        }
        None => aggregate::current_month_range()?,
    };

    let num_people = config.people.len();
    for (ix, person) in config.people.iter().enumerate() {
        let summary = aggregate::summarize(&store, person, start, end)?;
        println!("{}", summary.display_as_table(person));
        if ix + 1 < num_people {
            ui::print_separator();
        }
    }

    Ok(())
}
