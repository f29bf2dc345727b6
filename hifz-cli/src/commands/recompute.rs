//! Repair job: post outstanding exam rewards, then rebuild totals from
//! non-reversed transactions.

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use hifz_core::{ExamId, RepairEntry, RewardOutcome, StudentId};

use crate::config::ConfigLoader;

/// Recompute arguments
#[derive(Args, Debug)]
pub struct RecomputeArgs {
    /// Only recompute this student (default: every student with ledger activity)
    #[arg(long)]
    pub student: Option<StudentId>,
}

/// Run recompute command
pub async fn run(args: RecomputeArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let hifz = super::open(&config).await?;

    match args.student {
        Some(student) => {
            let aggregate = hifz.ledger.recompute_total(student).await?;
            println!("{}: {}", aggregate.student_id, aggregate.total_points);
        }
        None => {
            let rewards = hifz.exams.settle_pending_rewards().await?;
            if !rewards.is_empty() {
                println!("Retried {} exam reward(s):", rewards.len());
                println!("{}", rewards_table(&rewards));
            }

            let repaired = hifz.ledger.recompute_all().await?;
            if repaired.is_empty() {
                println!("All totals match their transactions.");
            } else {
                println!("Corrected {} total(s):", repaired.len());
                println!("{}", repairs_table(&repaired));
            }
        }
    }

    Ok(())
}

fn rewards_table(rewards: &[(ExamId, RewardOutcome)]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Exam").fg(Color::Cyan),
        Cell::new("Reward").fg(Color::Cyan),
        Cell::new("Detail").fg(Color::Cyan),
    ]);

    for (exam, outcome) in rewards {
        let (status, detail) = match outcome {
            RewardOutcome::Awarded(tx) => (
                Cell::new("awarded").fg(Color::Green),
                format!("{} ({:+})", tx.id, tx.amount),
            ),
            RewardOutcome::NotEligible => (Cell::new("not eligible"), String::new()),
            RewardOutcome::Pending { reason } => {
                (Cell::new("pending").fg(Color::Yellow), reason.clone())
            }
        };
        table.add_row(vec![Cell::new(exam), status, Cell::new(detail)]);
    }

    table
}

fn repairs_table(repaired: &[RepairEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Student").fg(Color::Cyan),
        Cell::new("Stored").fg(Color::Cyan),
        Cell::new("Corrected").fg(Color::Cyan),
    ]);

    for entry in repaired {
        table.add_row(vec![
            Cell::new(entry.student_id),
            Cell::new(entry.previous).fg(Color::Red),
            Cell::new(entry.corrected).fg(Color::Green),
        ]);
    }

    table
}
