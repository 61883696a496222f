//! # vg — VIGIL command line
//!
//! Caller-side surface of the query hub.
//!
//! - `vg query <entity>`: one historical page, printed as a table.
//! - `vg tail <entity>`: poll for new records, resubmitting the cursor.
//! - `vg push <entity> <file>`: send JSON or NDJSON records.
//! - `vg fields <entity>`: list the filterable fields.
//! - `vg status`: hub status.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use vg_core::{AlertRecord, Cursor, EntityKind, Endpoint, LogRecord, Stored};

/// VIGIL: query and tail IDS alerts and connection logs.
#[derive(Parser)]
#[command(name = "vg", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one page of historical records, newest first.
    Query {
        /// `alert` or `log`.
        entity: EntityKind,

        /// Filter expression, e.g. "priority<3 action=block".
        #[arg(long, short)]
        filter: Option<String>,

        /// Look back this far: 30m, 6h, 1d.
        #[arg(long, conflicts_with_all = ["from", "to"])]
        since: Option<String>,

        /// Range start (RFC 3339).
        #[arg(long, requires = "to")]
        from: Option<String>,

        /// Range end (RFC 3339).
        #[arg(long, requires = "from")]
        to: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: i64,

        #[arg(long)]
        page_size: Option<i64>,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Poll for new records until Ctrl-C.
    Tail {
        entity: EntityKind,

        #[arg(long, short)]
        filter: Option<String>,

        /// Seconds between polls.
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,

        /// Records kept in memory; the oldest are dropped first.
        #[arg(long, default_value_t = 500)]
        retain: usize,

        /// Maximum records per poll.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Push records from a JSON or NDJSON file.
    Push { entity: EntityKind, file: PathBuf },

    /// List the filterable fields of an entity type.
    Fields { entity: EntityKind },

    /// Report hub status as JSON.
    Status,
}

fn main() {
    let cli = Cli::parse();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to build tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(async_main(cli.command)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn async_main(cmd: Commands) -> Result<(), String> {
    let client = reqwest::Client::new();
    let base_url =
        std::env::var("VG_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

    match cmd {
        Commands::Query {
            entity,
            filter,
            since,
            from,
            to,
            page,
            page_size,
            json,
        } => {
            let mut params: Vec<(&str, String)> = vec![("page", page.to_string())];
            if let Some(f) = filter {
                params.push(("filters", f));
            }
            if let Some(s) = since {
                params.push(("since_minutes", parse_since(&s)?.to_string()));
            }
            if let (Some(f), Some(t)) = (from, to) {
                params.push(("from_time", f));
                params.push(("to_time", t));
            }
            if let Some(size) = page_size {
                params.push(("page_size", size.to_string()));
            }

            let url = format!("{}/api/v1/{}/query", base_url, collection(entity));
            if json {
                let value: serde_json::Value = fetch(client.get(&url).query(&params)).await?;
                println!("{}", pretty(&value));
                return Ok(());
            }
            match entity {
                EntityKind::Alert => print_history::<AlertRecord>(&client, &url, &params).await,
                EntityKind::Log => print_history::<LogRecord>(&client, &url, &params).await,
            }
        }

        Commands::Tail {
            entity,
            filter,
            interval_secs,
            retain,
            limit,
        } => {
            let url = format!("{}/api/v1/{}/query", base_url, collection(entity));
            let opts = TailOptions {
                filter,
                interval: Duration::from_secs(interval_secs.max(1)),
                retain,
                limit,
            };
            match entity {
                EntityKind::Alert => tail::<AlertRecord>(&client, &url, opts).await,
                EntityKind::Log => tail::<LogRecord>(&client, &url, opts).await,
            }
        }

        Commands::Push { entity, file } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
            let body = parse_records(&content)?;
            let url = format!("{}/api/v1/{}/push", base_url, collection(entity));
            let result: serde_json::Value = fetch(client.post(&url).json(&body)).await?;
            let inserted = result.get("inserted").and_then(|v| v.as_u64()).unwrap_or(0);
            println!("Pushed {} {} record(s)", inserted, entity);
            Ok(())
        }

        Commands::Fields { entity } => {
            let url = format!("{}/api/v1/fields/{}", base_url, entity);
            let resp: FieldsResponse = fetch(client.get(&url)).await?;
            let rows: Vec<FieldRow> = resp.fields.into_iter().map(FieldRow::from).collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
            if let Some(example) = resp.example {
                println!("Example: {}", example);
            }
            Ok(())
        }

        Commands::Status => {
            let url = format!("{}/api/status", base_url);
            let value: serde_json::Value = fetch(client.get(&url)).await?;
            println!("{}", pretty(&value));
            Ok(())
        }
    }
}

fn collection(entity: EntityKind) -> &'static str {
    match entity {
        EntityKind::Alert => "alerts",
        EntityKind::Log => "logs",
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// `30m`, `6h`, `2d` or a bare number of minutes.
fn parse_since(raw: &str) -> Result<i64, String> {
    let value = raw.trim();
    let invalid = || format!("invalid --since '{}', expected e.g. 30m, 6h, 1d", raw);
    if value.is_empty() {
        return Err(invalid());
    }
    if let Ok(minutes) = value.parse::<i64>() {
        return Ok(minutes);
    }
    let split = value.char_indices().last().map_or(0, |(i, _)| i);
    let (number, unit) = value.split_at(split);
    let amount: i64 = number.parse().map_err(|_| invalid())?;
    let minutes = match unit {
        "m" => Some(amount),
        "h" => amount.checked_mul(60),
        "d" => amount.checked_mul(60 * 24),
        _ => None,
    };
    minutes.ok_or_else(invalid)
}

/// A JSON document, or one JSON object per line.
fn parse_records(content: &str) -> Result<serde_json::Value, String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(content) {
        return Ok(value);
    }
    let records = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<serde_json::Value>(line)
                .map_err(|e| format!("line {}: {}", i + 1, e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::Value::Array(records))
}

// =============================================================================
// HTTP
// =============================================================================

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    kind: Option<String>,
}

async fn fetch<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, String> {
    let resp = req.send().await.map_err(|e| e.to_string())?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => match body.kind {
                Some(kind) => format!("{} ({}): {}", status, kind, body.error),
                None => format!("{}: {}", status, body.error),
            },
            Err(_) => format!("{}: {}", status, text),
        });
    }
    resp.json::<T>().await.map_err(|e| e.to_string())
}

#[derive(Deserialize)]
struct HistoryResponse<R> {
    items: Vec<Stored<R>>,
    total: u64,
    page: u64,
    total_pages: u64,
}

#[derive(Deserialize)]
struct LiveResponse<R> {
    items: Vec<Stored<R>>,
    next_cursor: Cursor,
}

#[derive(Deserialize)]
struct FieldsResponse {
    fields: Vec<FieldInfo>,
    #[serde(default)]
    example: Option<String>,
}

#[derive(Deserialize)]
struct FieldInfo {
    name: String,
    kind: String,
    operators: Vec<String>,
    indexed: bool,
    #[serde(default)]
    aliases: Vec<String>,
}

// =============================================================================
// Rendering
// =============================================================================

/// Records that can be printed as table rows and tail lines.
trait Render: DeserializeOwned {
    type Row: Tabled;

    fn row(stored: &Stored<Self>) -> Self::Row;
    fn line(stored: &Stored<Self>) -> String;
}

fn endpoint(e: &Endpoint) -> String {
    match (e.ip, e.port) {
        (Some(ip), Some(port)) => format!("{}:{}", ip, port),
        (Some(ip), None) => ip.to_string(),
        _ => "-".into(),
    }
}

fn host_port(ip: Option<std::net::IpAddr>, port: Option<u16>) -> String {
    endpoint(&Endpoint {
        ip,
        port,
        netmask: None,
    })
}

fn opt(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Ingested")]
    ingested: String,
    #[tabled(rename = "Prio")]
    priority: i64,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Rule")]
    rule_id: String,
    #[tabled(rename = "Source")]
    src: String,
    #[tabled(rename = "Destination")]
    dst: String,
    #[tabled(rename = "Message")]
    msg: String,
}

impl Render for AlertRecord {
    type Row = AlertRow;

    fn row(s: &Stored<Self>) -> AlertRow {
        AlertRow {
            ingested: s.ingested_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            priority: s.record.priority,
            action: s.record.action.clone(),
            rule_id: s.record.rule_id.clone(),
            src: endpoint(&s.record.src),
            dst: endpoint(&s.record.dst),
            msg: s.record.msg.clone(),
        }
    }

    fn line(s: &Stored<Self>) -> String {
        format!(
            "{} [{}] p{} {} {} -> {} {}",
            s.ingested_at.format("%H:%M:%S%.3f"),
            s.record.action,
            s.record.priority,
            s.record.rule_id,
            endpoint(&s.record.src),
            endpoint(&s.record.dst),
            s.record.msg
        )
    }
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Ingested")]
    ingested: String,
    #[tabled(rename = "Proto")]
    proto: String,
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Source")]
    src: String,
    #[tabled(rename = "Destination")]
    dst: String,
    #[tabled(rename = "State")]
    conn_state: String,
    #[tabled(rename = "Sensor")]
    sensor: String,
}

impl Render for LogRecord {
    type Row = LogRow;

    fn row(s: &Stored<Self>) -> LogRow {
        let r = &s.record;
        LogRow {
            ingested: s.ingested_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            proto: opt(r.proto.as_deref()),
            service: opt(r.service.as_deref()),
            src: host_port(r.orig_h, r.orig_p),
            dst: host_port(r.resp_h, r.resp_p),
            conn_state: opt(r.conn_state.as_deref()),
            sensor: opt(r.sensor_id.as_deref()),
        }
    }

    fn line(s: &Stored<Self>) -> String {
        let r = &s.record;
        format!(
            "{} {} {} {} -> {} {}",
            s.ingested_at.format("%H:%M:%S%.3f"),
            opt(r.proto.as_deref()),
            opt(r.service.as_deref()),
            host_port(r.orig_h, r.orig_p),
            host_port(r.resp_h, r.resp_p),
            opt(r.conn_state.as_deref())
        )
    }
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Operators")]
    operators: String,
    #[tabled(rename = "Indexed")]
    indexed: bool,
    #[tabled(rename = "Aliases")]
    aliases: String,
}

impl From<FieldInfo> for FieldRow {
    fn from(f: FieldInfo) -> Self {
        let symbols: Vec<&str> = f
            .operators
            .iter()
            .map(|op| match op.as_str() {
                "eq" => "=",
                "ne" => "!=",
                "gt" => ">",
                "lt" => "<",
                "contains" => "contains",
                other => other,
            })
            .collect();
        Self {
            name: f.name,
            kind: f.kind,
            operators: symbols.join(" "),
            indexed: f.indexed,
            aliases: f.aliases.join(", "),
        }
    }
}

async fn print_history<R: Render>(
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, String)],
) -> Result<(), String> {
    let resp: HistoryResponse<R> = fetch(client.get(url).query(params)).await?;
    let rows: Vec<R::Row> = resp.items.iter().map(R::row).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    println!(
        "page {}/{} · {} matching record(s)",
        resp.page, resp.total_pages, resp.total
    );
    Ok(())
}

// =============================================================================
// Live Tail
// =============================================================================

/// Bounded, newest-first buffer of live records held by the caller.
#[derive(Debug)]
struct LiveBuffer<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> LiveBuffer<T> {
    fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap.min(4096)),
            cap,
        }
    }

    /// Add a batch given in arrival order, evicting the oldest beyond `cap`.
    fn extend(&mut self, batch: impl IntoIterator<Item = T>) {
        for item in batch {
            self.items.push_front(item);
        }
        self.items.truncate(self.cap);
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn newest(&self) -> Option<&T> {
        self.items.front()
    }
}

struct TailOptions {
    filter: Option<String>,
    interval: Duration,
    retain: usize,
    limit: Option<i64>,
}

async fn tail<R: Render>(client: &reqwest::Client, url: &str, opts: TailOptions) -> Result<(), String> {
    let mut cursor = Cursor::origin();
    let mut buffer: LiveBuffer<Stored<R>> = LiveBuffer::new(opts.retain);
    let mut ticker = tokio::time::interval(opts.interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    eprintln!("Tailing {} every {:?} (Ctrl-C to stop)", url, opts.interval);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                let mut params: Vec<(&str, String)> = vec![
                    ("realtime", "true".into()),
                    ("cursor", cursor.to_string()),
                ];
                if let Some(f) = &opts.filter {
                    params.push(("filters", f.clone()));
                }
                if let Some(limit) = opts.limit {
                    params.push(("limit", limit.to_string()));
                }

                match fetch::<LiveResponse<R>>(client.get(url).query(&params)).await {
                    Ok(page) => {
                        for item in &page.items {
                            println!("{}", R::line(item));
                        }
                        buffer.extend(page.items);
                        cursor = page.next_cursor;
                    }
                    // keep the cursor; the next poll resumes from it
                    Err(e) => eprintln!("poll failed: {}", e),
                }
            }
        }
    }

    eprintln!(
        "Stopped at cursor {}; {} record(s) retained{}",
        cursor,
        buffer.len(),
        buffer
            .newest()
            .map(|s| format!(", newest ingested {}", s.ingested_at.to_rfc3339()))
            .unwrap_or_default()
    );
    Ok(())
}
