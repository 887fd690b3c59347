//! `folio ask` and `folio context`: the chat pipeline from the command line.

use anyhow::Result;

use folio_core::models::Link;

use crate::config::Config;
use crate::generation::create_generator;
use crate::selector::ContextSelector;

/// Selects context, generates an answer and prints it with its links.
pub async fn run_ask(config: &Config, question: &str, section: Option<&str>) -> Result<()> {
    let selector = ContextSelector::from_config(config);
    let generator = create_generator(&config.generation);

    let selection = selector.select(section, question).await;
    let (answer, backend_links) = generator.answer(question, &selection.context).await;
    let links = selector.merge_links(backend_links, &selection.context);

    println!("{}", answer);
    print_links(&links);
    println!();
    println!(
        "[{} | {} context | chip: {}]",
        generator.name(),
        selection.strategy.as_str(),
        section.unwrap_or("Overview")
    );
    Ok(())
}

/// Prints the context that would be handed to the generator.
pub async fn run_context(config: &Config, question: &str, section: Option<&str>) -> Result<()> {
    let selector = ContextSelector::from_config(config);
    let selection = selector.select(section, question).await;
    let links = selector.extract_links(&selection.context);

    println!("--- Context ({}) ---", selection.strategy.as_str());
    println!("{}", selection.context);
    print_links(&links);
    Ok(())
}

fn print_links(links: &[Link]) {
    if links.is_empty() {
        return;
    }
    println!();
    println!("--- Links ---");
    for link in links {
        println!("{}: {}", link.label, link.url);
    }
}
