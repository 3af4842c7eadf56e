use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};

use shardkit::DataValue;
use shardkit::route::{HintValues, RoutingEngine, ShardingConditionValue, ShardingConditions, ValueRange};
use shardkit::rule::inline::expand_data_nodes;
use shardkit::rule::{AlgorithmRegistry, ShardingRule, ShardingRuleConfiguration};
use shardkit::statement::{StatementContext, StatementKind};

#[derive(Parser)]
#[command(author, version, about = "Shardkit CLI - inspect sharding rules and routes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Select,
    Insert,
    Update,
    Delete,
}

impl From<Kind> for StatementKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Select => StatementKind::Select,
            Kind::Insert => StatementKind::Insert,
            Kind::Update => StatementKind::Update,
            Kind::Delete => StatementKind::Delete,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a rule file and print its tables
    Check {
        /// Rule configuration (JSON)
        rule: PathBuf,
    },

    /// Print the route units of a statement
    Route {
        /// Rule configuration (JSON)
        #[arg(short, long)]
        rule: PathBuf,

        /// Logical tables referenced by the statement
        #[arg(short, long, required = true)]
        table: Vec<String>,

        /// Sharding predicate: `[table.]column=value`, `column=a,b` or `column=lo..hi`
        #[arg(short = 'w', long = "where")]
        predicates: Vec<String>,

        /// Database hint value
        #[arg(long)]
        database_hint: Vec<String>,

        /// Table hint value
        #[arg(long)]
        table_hint: Vec<String>,

        #[arg(short, long, value_enum, default_value = "select")]
        kind: Kind,
    },

    /// Expand an inline data node expression
    Nodes {
        /// e.g. `ds_${0..1}.t_order_${0..3}`
        expression: String,
    },
}

fn load_rule(path: &PathBuf) -> Result<std::sync::Arc<ShardingRule>> {
    let config = ShardingRuleConfiguration::from_path(path)
        .with_context(|| format!("Failed to load rule file {}", path.display()))?;
    let rule = ShardingRule::build(&config, &AlgorithmRegistry::default())
        .with_context(|| format!("Invalid rule file {}", path.display()))?;
    Ok(rule)
}

fn parse_value(text: &str) -> DataValue {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        DataValue::Integer(i)
    } else if let Ok(f) = text.parse::<f64>() {
        DataValue::Float(f)
    } else {
        DataValue::Text(text.trim_matches('\'').to_string())
    }
}

fn parse_predicate(text: &str, default_table: &str) -> Result<ShardingConditionValue> {
    let (target, value) = text.split_once('=').ok_or_else(|| anyhow!("Predicate '{}' has no '='", text))?;
    let (table, column) = match target.trim().split_once('.') {
        Some((table, column)) => (table, column),
        None => (default_table, target.trim()),
    };
    if column.is_empty() {
        bail!("Predicate '{}' has no column", text);
    }
    let condition = if let Some((lo, hi)) = value.split_once("..") {
        ShardingConditionValue::range(table, column, ValueRange::closed(parse_value(lo), parse_value(hi)))
    } else if value.contains(',') {
        ShardingConditionValue::list(table, column, value.split(',').map(parse_value).collect())
    } else {
        ShardingConditionValue::equal(table, column, parse_value(value))
    };
    Ok(condition)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { rule } => {
            let rule = load_rule(&rule)?;
            println!("Data sources: {}", rule.data_source_names().join(", "));
            for table in rule.table_rules() {
                println!("Table {}: {} data node(s)", table.logic_table, table.actual_data_nodes.len());
            }
            println!("Rule is valid");
        }
        Commands::Route { rule, table, predicates, database_hint, table_hint, kind } => {
            let rule = load_rule(&rule)?;
            let tables: Vec<&str> = table.iter().map(String::as_str).collect();
            let values = predicates
                .iter()
                .map(|p| parse_predicate(p, tables[0]))
                .collect::<Result<Vec<_>>>()?;
            let hint = HintValues::new(
                database_hint.iter().map(|v| parse_value(v)).collect(),
                table_hint.iter().map(|v| parse_value(v)).collect(),
            );
            let conditions =
                if values.is_empty() { ShardingConditions::default() } else { ShardingConditions::single(values) };
            let ctx = StatementContext::new(kind.into(), &tables).with_conditions(conditions).with_hint(hint);

            let route = RoutingEngine::route(&ctx, &rule)?;
            if route.is_empty() {
                println!("No route units");
            }
            for unit in route.route_units() {
                println!("{}", unit);
            }
        }
        Commands::Nodes { expression } => {
            for node in expand_data_nodes(&expression)? {
                println!("{}", node);
            }
        }
    }

    Ok(())
}
