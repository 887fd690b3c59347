use anyhow::Result;

use folio_core::models::Section;

use crate::config::Config;
use crate::store::PortfolioStore;

/// Lists the portfolio's sections with their record counts.
///
/// Fails when the document cannot be read or parsed, unlike the request
/// path which degrades to the empty document.
pub fn run_sections(config: &Config) -> Result<()> {
    let store = PortfolioStore::from_path(config.portfolio.path.clone());
    let portfolio = store.try_force_reload()?;

    println!("{:<16} {:<8} PRESENT", "SECTION", "RECORDS");
    for section in Section::ALL {
        let present = portfolio.has(section);
        println!(
            "{:<16} {:<8} {}",
            section.key(),
            portfolio.record_count(section),
            if present { "yes" } else { "no" }
        );
    }
    for key in portfolio.extra.keys() {
        println!("{:<16} {:<8} {}", key, "-", "yes (unrecognized)");
    }
    Ok(())
}
