use clap::Args;

use roundtrip_core::error::HarnessError;
use roundtrip_core::fixture::FixtureCatalog;

use super::Settings;

#[derive(Args, Debug)]
pub struct FixtureArgs {
    #[command(flatten)]
    pub settings: Settings,

    /// Output format: text, toml
    #[arg(long, default_value = "text", value_parser = ["text", "toml"])]
    pub format: String,
}

pub fn run(args: &FixtureArgs) -> anyhow::Result<()> {
    let config = args.settings.resolve()?;
    let catalog = super::load_catalog(&config)?;

    match args.format.as_str() {
        "toml" => print!(
            "{}",
            catalog.to_toml_string().map_err(HarnessError::from)?
        ),
        _ => print!("{}", render_text(&catalog)),
    }
    Ok(())
}

fn render_text(catalog: &FixtureCatalog) -> String {
    let mut out = String::new();

    out.push_str(&format!("Entities ({})\n", catalog.entities().len()));
    for (i, e) in catalog.entities().iter().enumerate() {
        out.push_str(&format!(
            "  {i:>2}  {:<24} {:<14} {}\n",
            e.id.as_str(),
            e.kind.as_str(),
            e.name
        ));
    }

    out.push_str(&format!(
        "\nRelationships ({})\n",
        catalog.relationships().len()
    ));
    for (i, t) in catalog.declared_tuples().iter().enumerate() {
        out.push_str(&format!("  {i:>2}  {t}\n"));
    }

    let probes = catalog.probes();
    out.push_str("\nProbes\n");
    out.push_str(&format!("  similarity  {}\n", probes.similarity));
    out.push_str(&format!("  traversal   {}\n", probes.traversal));
    let expected: Vec<String> = catalog
        .expected_traversal()
        .iter()
        .map(ToString::to_string)
        .collect();
    out.push_str(&format!("  reaches     {}\n", expected.join(", ")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_lists_every_entity_and_probe() {
        let text = render_text(&FixtureCatalog::health_care());
        assert!(text.starts_with("Entities (9)\n"));
        assert!(text.contains("Relationships (17)"));
        assert!(text.contains("similarity  beta-blocker-therapy"));
        assert!(text.contains("atrial-fibrillation"));
    }
}
