//! Command implementations.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use confmirror_core::RetrievedFile;
use confmirror_git::VersionedRepository;
use serde::Serialize;
use tracing::info;

use crate::cli::Commands;

/// A retrieved file as listed on stdout.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileSummary<'a> {
    file_name: &'a str,
    mime_type: &'a str,
    size: usize,
}

impl<'a> From<&'a RetrievedFile> for FileSummary<'a> {
    fn from(file: &'a RetrievedFile) -> Self {
        Self {
            file_name: file.file_name(),
            mime_type: file.mime_type(),
            size: file.data().len(),
        }
    }
}

/// Runs `command` against `repository`, printing the result.
pub async fn run(command: Commands, repository: &VersionedRepository, json: bool) -> Result<()> {
    match command {
        Commands::Ensure { .. } => {
            let report = repository.sync().await?;
            if json {
                print_json(&serde_json::json!({
                    "kind": format!("{:?}", report.kind),
                    "attempt": report.attempt.to_string(),
                    "tagCount": report.tag_count,
                }))?;
            } else {
                println!(
                    "{:?} via {} attempt, {} tags",
                    report.kind, report.attempt, report.tag_count
                );
            }
        },
        Commands::Tags { .. } => {
            let tags = repository.list_tags().await?;
            if json {
                print_json(&tags)?;
            } else {
                for tag in &tags {
                    println!("{}\t{}\t{}", tag.name(), tag.timestamp().to_rfc3339(), tag.commit_id());
                }
            }
        },
        Commands::OlderThan { tag, .. } => {
            let names = repository.tags_older_than(&tag).await?;
            print_lines(&names, json)?;
        },
        Commands::Files {
            tag, pattern, out, ..
        } => {
            let files = repository.get_files_at_tag(&tag, &pattern).await?;
            match out {
                Some(dir) => {
                    let written = write_files(&dir, &files)?;
                    info!("Wrote {} files below {}", written.len(), dir.display());
                    let written: Vec<String> =
                        written.iter().map(|p| p.display().to_string()).collect();
                    print_lines(&written, json)?;
                },
                None if json => {
                    let summaries: Vec<FileSummary<'_>> = files.iter().map(Into::into).collect();
                    print_json(&summaries)?;
                },
                None => {
                    for file in &files {
                        println!("{}\t{}\t{}", file.file_name(), file.mime_type(), file.data().len());
                    }
                },
            }
        },
        Commands::Present { tag, path, .. } => {
            let present = repository.is_path_present_at_tag(&tag, &path).await?;
            print_bool(present, json)?;
        },
        Commands::Changed { from, to, path, .. } => {
            let changed = repository.did_path_change_between_tags(&from, &to, &path).await?;
            print_bool(changed, json)?;
        },
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_lines(lines: &[String], json: bool) -> Result<()> {
    if json {
        return print_json(lines);
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn print_bool(value: bool, json: bool) -> Result<()> {
    if json {
        print_json(&value)
    } else {
        println!("{}", value);
        Ok(())
    }
}

/// Writes `files` below `dir`, keeping their repository-relative paths.
pub fn write_files(dir: &Path, files: &[RetrievedFile]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(files.len());

    for file in files {
        let relative = Path::new(file.file_name());
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("refusing to write {} outside {}", file.file_name(), dir.display());
        }

        let target = dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        fs::write(&target, file.data())
            .with_context(|| format!("cannot write {}", target.display()))?;
        written.push(target);
    }

    Ok(written)
}
