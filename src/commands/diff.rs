use crate::args;
use crate::commands;
use crate::errors::*;
use crate::model::tag::LATEST;
use crate::repo::Engine;
use std::path::Path;
use tabled::builder::Builder;
use tabled::settings::Style;

pub async fn run(config_path: &Path, args: &args::Diff) -> Result<()> {
    let repos = commands::load_repos(config_path)?;
    let config = commands::find_repo(&repos, &args.repo)?;
    let engine = Engine::init(config.clone()).await?;

    // A single selector has nothing to diff against; default the second
    // side to `latest`, same convenience the original CLI offered.
    let selectors = if args.selectors.len() == 1 {
        vec![args.selectors[0].clone(), LATEST.to_string()]
    } else {
        args.selectors.clone()
    };

    let table = engine.diff(&selectors).await?;
    if table.rows.is_empty() {
        println!("no differences");
        return Ok(());
    }

    let mut builder = Builder::default();
    let mut header = vec!["PACKAGE".to_string()];
    header.extend(table.columns.iter().cloned());
    builder.push_record(header);
    for (name, values) in &table.rows {
        let mut row = vec![name.clone()];
        row.extend(values.iter().cloned());
        builder.push_record(row);
    }

    let table = builder.build().with(Style::empty()).to_string();
    println!("{table}");
    Ok(())
}
