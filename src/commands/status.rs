use crate::args;
use crate::commands;
use crate::errors::*;
use crate::repo::Engine;
use std::path::Path;
use tabled::Tabled;

#[derive(Tabled)]
struct RepoRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "SUFFIX")]
    suffix: String,
    #[tabled(rename = "ENABLED")]
    enabled: bool,
    #[tabled(rename = "REVISIONS")]
    revisions: usize,
    #[tabled(rename = "TAGS")]
    tags: usize,
    #[tabled(rename = "LATEST")]
    latest: String,
}

#[derive(Tabled)]
struct RevisionRow {
    #[tabled(rename = "REVISION")]
    revision: String,
    #[tabled(rename = "TIMESTAMP")]
    timestamp: String,
    #[tabled(rename = "TAGS")]
    tags: String,
}

pub async fn run(config_path: &Path, args: &args::Status) -> Result<()> {
    let repos = commands::load_repos(config_path)?;
    if repos.is_empty() {
        println!("No repositories configured");
        return Ok(());
    }

    match &args.repo {
        Some(name) => {
            let config = commands::find_repo(&repos, name)?;
            let engine = Engine::init(config.clone()).await?;
            print_revisions(&engine);
        }
        None => {
            let mut rows = Vec::with_capacity(repos.len());
            for config in &repos {
                let engine = Engine::init(config.clone()).await?;
                rows.push(RepoRow {
                    name: config.name.clone(),
                    suffix: config.suffix.clone(),
                    enabled: config.enabled,
                    revisions: engine.revisions().len(),
                    tags: engine.tags().len(),
                    latest: engine
                        .last_updated()
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                });
            }
            print_table(rows);
        }
    }

    Ok(())
}

fn print_revisions(engine: &Engine) {
    let mut rows: Vec<RevisionRow> = engine
        .revisions()
        .iter()
        .map(|revision| {
            let mut tags: Vec<&str> = engine.tags().iter().filter(|(_, r)| r == revision).map(|(n, _)| n).collect();
            tags.sort();
            RevisionRow {
                revision: revision.to_string(),
                timestamp: revision.timestamp(),
                tags: if tags.is_empty() { "-".to_string() } else { tags.join(",") },
            }
        })
        .collect();
    rows.sort_by(|a, b| a.revision.cmp(&b.revision));

    if rows.is_empty() {
        println!("no revisions materialized yet");
        return;
    }
    print_table(rows);
}

fn print_table<T: Tabled>(rows: Vec<T>) {
    use tabled::settings::Style;
    let table = tabled::Table::new(rows).with(Style::empty()).to_string();
    println!("{table}");
}
