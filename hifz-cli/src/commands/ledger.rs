//! Ledger inspection and reversal commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use hifz_core::{PointTransaction, StudentId, TransactionId};
use tracing::info;

use crate::config::ConfigLoader;

/// Ledger arguments
#[derive(Args, Debug)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub command: LedgerCommands,
}

/// Ledger subcommands
#[derive(Subcommand, Debug)]
pub enum LedgerCommands {
    /// Show a student's point total
    Total {
        #[arg(long)]
        student: StudentId,
    },
    /// Show a student's transactions, newest first
    History {
        #[arg(long)]
        student: StudentId,

        /// Hide reversed transactions
        #[arg(long)]
        active_only: bool,
    },
    /// Reverse a transaction and remove its amount from the total
    Reverse {
        /// Transaction ID to reverse
        id: TransactionId,
    },
}

/// Run ledger command
pub async fn run(args: LedgerArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let hifz = super::open(&config).await?;

    match args.command {
        LedgerCommands::Total { student } => {
            let total = hifz.ledger.total(student).await?;
            println!("{}", total);
        }
        LedgerCommands::History {
            student,
            active_only,
        } => {
            let mut history = hifz.ledger.history(student).await?;
            if active_only {
                history.retain(PointTransaction::is_active);
            }
            if history.is_empty() {
                println!("No transactions for student {}", student);
            } else {
                println!("{}", history_table(&history));
            }
        }
        LedgerCommands::Reverse { id } => {
            info!(transaction = %id, "Reversing transaction");
            let reversed = hifz.ledger.reverse(id).await?;
            let total = hifz.ledger.total(reversed.student_id).await?;
            println!("Reversed {} ({:+})", reversed.id, reversed.amount);
            println!("New total for {}: {}", reversed.student_id, total);
        }
    }

    Ok(())
}

fn history_table(history: &[PointTransaction]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::Cyan),
        Cell::new("When").fg(Color::Cyan),
        Cell::new("Source").fg(Color::Cyan),
        Cell::new("Amount").fg(Color::Cyan),
        Cell::new("Reason").fg(Color::Cyan),
    ]);

    for tx in history {
        let amount = Cell::new(format!("{:+}", tx.amount));
        let amount = match tx.reversed_at {
            Some(_) => amount.fg(Color::DarkGrey),
            None if tx.amount < 0 => amount.fg(Color::Red),
            None => amount.fg(Color::Green),
        };
        let reason = match tx.reversed_at {
            Some(at) => format!("{} (reversed {})", tx.reason, at.format("%Y-%m-%d %H:%M")),
            None => tx.reason.clone(),
        };
        table.add_row(vec![
            Cell::new(tx.id),
            Cell::new(tx.created_at.format("%Y-%m-%d %H:%M")),
            Cell::new(tx.source_type),
            amount,
            Cell::new(reason),
        ]);
    }

    table
}
