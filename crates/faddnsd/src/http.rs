//! HTTP transport
//!
//! - `GET /?host=..&version=..&inet=..&inet6=..&ether=..`: report addresses
//!   (address parameters may repeat)
//! - `GET /dump`: all stored reports as a JSON array
//! - `GET /dump.jsonl`: the same, one JSON object per line
//! - `GET /listhosts`: HTML host table with "add" links for unpaired hosts
//! - `GET /addhost?host=..`: force-add a host without a placeholder
//! - `GET /status`: bookkeeping sets and the last cycle outcome

use axum::{
    Json, Router,
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse},
    routing::get,
};
use faddns_core::{Ack, DumpEntry, Ingestor};
use serde::Deserialize;
use std::net::SocketAddr;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Build the router serving `ingestor`
pub fn router(ingestor: Ingestor) -> Router {
    Router::new()
        .route("/", get(report))
        .route("/dump", get(dump))
        .route("/dump.jsonl", get(dump_lines))
        .route("/listhosts", get(list_hosts))
        .route("/addhost", get(add_host))
        .route("/status", get(status))
        .with_state(ingestor)
}

/// Client address as seen through an optional reverse proxy
fn source_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

fn ack_response(ack: Ack) -> (StatusCode, String) {
    let status = if ack.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, ack.to_string())
}

/// GET / - report addresses
async fn report(
    State(ingestor): State<Ingestor>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    let mut host = None;
    let mut version = None;
    let mut addresses = Vec::new();

    for (key, value) in &params {
        match key.as_str() {
            "host" => host = host.or(Some(value.as_str())),
            "version" => version = version.or(Some(value.as_str())),
            _ => addresses.push((key.as_str(), value.as_str())),
        }
    }

    let source = source_address(&headers, peer);
    let ack = ingestor
        .report_addresses(host, version, &source, addresses)
        .await;
    ack_response(ack)
}

/// GET /dump - all stored reports
async fn dump(State(ingestor): State<Ingestor>) -> impl IntoResponse {
    Json(ingestor.dump().await)
}

/// GET /dump.jsonl - all stored reports, newline-delimited
async fn dump_lines(
    State(ingestor): State<Ingestor>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut body = String::new();
    for entry in ingestor.dump().await {
        let line = serde_json::to_string(&entry)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        body.push_str(&line);
        body.push('\n');
    }
    Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], body))
}

/// GET /listhosts - operator host table
async fn list_hosts(State(ingestor): State<Ingestor>) -> Html<String> {
    Html(host_table(&ingestor.dump().await))
}

fn host_table(entries: &[DumpEntry]) -> String {
    let mut html = String::from(
        "<html><body><table>\n<tr><th>hostname</th><th>datetime</th><th>version</th>\
         <th>ether</th><th>inet</th><th>inet6</th><th>remote_addr</th><th>ops</th></tr>\n",
    );

    for entry in entries {
        html.push_str("<tr>");
        for cell in [
            escape_html(&entry.hostname),
            escape_html(&entry.datetime),
            escape_html(entry.version.as_deref().unwrap_or_default()),
            address_cell(&entry.ether),
            address_cell(&entry.inet),
            address_cell(&entry.inet6),
            escape_html(&entry.remote_addr),
        ] {
            html.push_str("<td>");
            html.push_str(&cell);
            html.push_str("</td>");
        }
        if entry.unpaired {
            html.push_str(&format!(
                "<td><a href=\"/addhost?host={}\">add</a></td>",
                escape_html(&encode_query(&entry.hostname))
            ));
        } else {
            html.push_str("<td></td>");
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</table></body></html>\n");
    html
}

fn address_cell(addresses: &[String]) -> String {
    addresses
        .iter()
        .map(|a| escape_html(a))
        .collect::<Vec<_>>()
        .join("<br/>")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encode a query parameter value
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct AddHostParams {
    host: Option<String>,
}

/// GET /addhost - force-add a host
async fn add_host(
    State(ingestor): State<Ingestor>,
    Query(params): Query<AddHostParams>,
) -> impl IntoResponse {
    let host = params.host.unwrap_or_default();
    match ingestor.force_add(&host).await {
        Ack::Ok => (StatusCode::OK, format!("will add {}", host.trim().to_lowercase())),
        rejected => ack_response(rejected),
    }
}

/// GET /status - reconciliation health
async fn status(State(ingestor): State<Ingestor>) -> impl IntoResponse {
    Json(ingestor.status().await)
}
