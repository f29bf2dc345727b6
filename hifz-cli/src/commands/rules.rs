//! Point rule administration for a tenant.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use hifz_core::{PointRule, RuleKey, TenantId};

use crate::config::ConfigLoader;

/// Rules management arguments
#[derive(Args, Debug)]
pub struct RulesArgs {
    /// Tenant whose rules to manage
    #[arg(long, global = true)]
    pub tenant: Option<TenantId>,

    #[command(subcommand)]
    pub command: RulesCommands,
}

/// Rules subcommands
#[derive(Subcommand, Debug)]
pub enum RulesCommands {
    /// List the tenant's rules
    List,
    /// Create or update a rule
    Set {
        /// Rule key (e.g. RECITATION_EXCELLENT)
        #[arg(value_parser = parse_rule_key)]
        key: RuleKey,

        /// Signed points for the outcome
        #[arg(allow_negative_numbers = true)]
        points: i64,

        /// Description shown to staff
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Stop a rule from resolving
    Disable {
        #[arg(value_parser = parse_rule_key)]
        key: RuleKey,
    },
    /// Re-enable a disabled rule
    Enable {
        #[arg(value_parser = parse_rule_key)]
        key: RuleKey,
    },
    /// Create any missing rules from configured defaults
    Seed,
}

/// Run rules command
pub async fn run(args: RulesArgs) -> Result<()> {
    let Some(tenant) = args.tenant else {
        anyhow::bail!("--tenant is required");
    };
    let config = ConfigLoader::load()?;
    let hifz = super::open(&config).await?;
    let registry = &hifz.registry;

    match args.command {
        RulesCommands::List => {
            let rules = registry.list_rules(tenant).await?;
            if rules.is_empty() {
                println!("No rules for tenant {}.", tenant);
                println!();
                println!("Run `hifz rules seed --tenant {}` to create the defaults.", tenant);
            } else {
                println!("{}", rules_table(&rules));
            }
        }
        RulesCommands::Set {
            key,
            points,
            description,
        } => {
            let description = match description {
                Some(description) => description,
                None => registry
                    .list_rules(tenant)
                    .await?
                    .into_iter()
                    .find(|rule| rule.key == key)
                    .map(|rule| rule.description)
                    .unwrap_or_else(|| key.to_string()),
            };
            let rule = registry.upsert_rule(tenant, key, description, points).await?;
            println!("{} = {} ({})", rule.key, rule.points, active_label(&rule));
        }
        RulesCommands::Disable { key } => {
            let rule = registry.set_active(tenant, key, false).await?;
            println!("{} disabled", rule.key);
        }
        RulesCommands::Enable { key } => {
            let rule = registry.set_active(tenant, key, true).await?;
            println!("{} enabled", rule.key);
        }
        RulesCommands::Seed => {
            let created = registry.seed_defaults(tenant, &config.rules).await?;
            println!("Created {} rule(s) for tenant {}", created, tenant);
        }
    }

    Ok(())
}

fn parse_rule_key(s: &str) -> Result<RuleKey, String> {
    RuleKey::parse(&s.to_ascii_uppercase()).ok_or_else(|| {
        let known: Vec<&str> = RuleKey::ALL.iter().map(RuleKey::as_str).collect();
        format!("unknown rule key '{}' (expected one of: {})", s, known.join(", "))
    })
}

fn active_label(rule: &PointRule) -> &'static str {
    if rule.is_active { "active" } else { "disabled" }
}

fn rules_table(rules: &[PointRule]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Key").fg(Color::Cyan),
        Cell::new("Points").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
        Cell::new("Description").fg(Color::Cyan),
    ]);

    for rule in rules {
        let status = if rule.is_active {
            Cell::new(active_label(rule)).fg(Color::Green)
        } else {
            Cell::new(active_label(rule)).fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(rule.key),
            Cell::new(rule.points),
            status,
            Cell::new(&rule.description),
        ]);
    }

    table
}
