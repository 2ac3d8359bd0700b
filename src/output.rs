//! Terminal output for the CLI.

use std::fmt::Display;

use console::{style, Style};
use serde::{Deserialize, Serialize};
use tabled::{settings::Style as TableStyle, Table, Tabled};

use crate::error::Result;
use crate::events::{Event, EventKind};
use crate::status::{ClusterStatusResult, NodeRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

#[derive(Debug, Serialize, Tabled)]
struct NodeRow {
    #[tabled(rename = "Datacenter")]
    datacenter: String,
    #[tabled(rename = "Rack")]
    rack: String,
    #[tabled(rename = "Ordinal")]
    ordinal: String,
    #[tabled(rename = "Rack Ordinal")]
    rack_ordinal: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Host ID")]
    host_id: String,
    #[tabled(rename = "Load")]
    load: String,
    #[tabled(rename = "Tokens")]
    tokens: String,
    #[tabled(rename = "Owns")]
    owns: String,
}

impl From<&NodeRecord> for NodeRow {
    fn from(n: &NodeRecord) -> Self {
        Self {
            datacenter: n.datacenter.clone(),
            rack: n.rack.clone(),
            ordinal: n
                .flat_ordinal
                .map_or_else(|| "-".to_string(), |flat| flat.to_string()),
            rack_ordinal: n.ordinal.to_string(),
            status: status_indicator(&n.status.to_string()),
            state: status_indicator(&n.state.to_string()),
            address: n.address.clone(),
            host_id: n.host_id.clone(),
            load: n.load.clone(),
            tokens: n.tokens.clone(),
            owns: n.owns.clone(),
        }
    }
}

/// Render a cluster status in the requested format.
pub fn render_status(result: &ClusterStatusResult, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Table => {
            if result.nodes.is_empty() {
                format!("{}", style("No nodes reported").dim())
            } else {
                let rows: Vec<NodeRow> = result.nodes.iter().map(NodeRow::from).collect();
                Table::new(rows).with(TableStyle::rounded()).to_string()
            }
        }
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
        OutputFormat::Yaml => serde_yaml::to_string(result)?,
    })
}

/// Print a cluster status to stdout.
pub fn print_status(result: &ClusterStatusResult, format: OutputFormat) -> Result<()> {
    let rendered = render_status(result, format)?;
    if format == OutputFormat::Table {
        print_header(&format!("Cluster: {}", result.cluster_name));
        println!("{}", rendered);
        if !result.is_consistent() {
            println!();
            warning(format!(
                "{} conflicting observations between members",
                result.divergences.len()
            ));
        }
    } else {
        println!("{}", rendered);
    }
    Ok(())
}

/// One line describing an event.
pub fn format_event(event: &Event) -> String {
    match event.kind {
        EventKind::Progress => format!("⏳ {}", event.message),
        EventKind::Status => format!("{} {}", style("ℹ").blue().bold(), event.message),
        EventKind::Completion => format!("✅ {}", event.message),
        EventKind::Error => match &event.error {
            Some(err) => format!("❌ {}: {}", event.message, err.message),
            None => format!("❌ {}", event.message),
        },
    }
}

/// Print an event as it arrives.
///
/// Errors always go to stderr. With a machine-readable format everything
/// does, so stdout carries only the result document.
pub fn print_event(event: &Event, format: OutputFormat) {
    let line = format_event(event);
    match (event.kind, format) {
        (EventKind::Error, _) | (_, OutputFormat::Json | OutputFormat::Yaml) => eprintln!("{}", line),
        _ => println!("{}", line),
    }
}

/// Success message
pub fn success(msg: impl Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Warning message
pub fn warning(msg: impl Display) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Error message
pub fn error(msg: impl Display) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: impl Display) {
    let key_style = Style::new().cyan().bold();
    println!("{}: {}", key_style.apply_to(key), value);
}

/// Print a section header
pub fn print_header(title: &str) {
    println!();
    println!("{}", style(title).bold().underlined());
    println!();
}

/// Node status or state with color
pub fn status_indicator(status: &str) -> String {
    match status {
        "Up" | "Normal" => format!("{}", style(status).green()),
        "Joining" | "Leaving" | "Moving" => format!("{}", style(status).yellow()),
        "Down" => format!("{}", style(status).red()),
        _ => status.to_string(),
    }
}
