//! Server-rendered integration pages. Markup is small enough to build with
//! `format!`; every value taken from the database goes through [`escape`].

use lorelai_core::indexing::RunWithItems;
use lorelai_core::model::{IndexingStatus, ItemStatus, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Connected,
    /// Another member of the organisation holds the credential.
    ConnectedByTeammate,
    NotConnected,
}

#[derive(Debug, Clone, Copy)]
pub struct PanelView {
    pub provider: Provider,
    pub connection: Connection,
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 2rem; color: #1f2933; }
.panels { display: grid; grid-template-columns: repeat(auto-fill, minmax(16rem, 1fr)); gap: 1rem; }
.panel { border: 1px solid #d9e2ec; border-radius: 8px; padding: 1rem; }
.alert { display: none; margin-top: .5rem; padding: .5rem; border-radius: 4px; }
.alert.error { display: block; background: #ffe3e3; color: #8a1c1c; }
.alert.ok { display: block; background: #e3f9e5; color: #0e5814; }
.badge { padding: .1rem .5rem; border-radius: 999px; font-size: .8rem; }
.badge.completed { background: #e3f9e5; color: #0e5814; }
.badge.completed_with_errors { background: #fff3c4; color: #8d6b00; }
.badge.failed { background: #ffe3e3; color: #8a1c1c; }
.badge.in_progress { background: #dceefb; color: #0b4f82; }
.badge.skipped { background: #f0f4f8; color: #52606d; }
table { border-collapse: collapse; width: 100%; }
td, th { text-align: left; padding: .3rem .6rem; border-bottom: 1px solid #f0f4f8; }
tr.items { display: none; }
tr.items.open { display: table-row; }
#details { display: none; position: fixed; inset: 10%; background: #fff; border: 1px solid #9fb3c8; padding: 1rem; overflow: auto; }
#details.open { display: block; }
pre { white-space: pre-wrap; background: #f0f4f8; padding: .5rem; }
"#;

// Network failures (fetch rejects) and API failures (non-2xx with {error})
// are reported differently.
const PANEL_SCRIPT: &str = r#"
function showAlert(box, kind, text) {
  box.className = 'alert ' + kind;
  box.textContent = text;
}
async function revokeIntegration(provider) {
  const panel = document.getElementById('panel-' + provider);
  const box = panel.querySelector('.alert');
  const button = panel.querySelector('button');
  button.disabled = true;
  let res;
  try {
    res = await fetch('/api/v1/' + provider + '/revoke', { method: 'POST' });
  } catch (e) {
    showAlert(box, 'error', 'Network error: the server could not be reached.');
    button.disabled = false;
    return;
  }
  let body = {};
  try { body = await res.json(); } catch (e) {}
  if (!res.ok) {
    showAlert(box, 'error', body.error || ('Request failed with status ' + res.status));
    button.disabled = false;
    return;
  }
  panel.querySelector('.state').textContent = 'Not connected';
  button.remove();
  showAlert(box, 'ok', body.message || 'Integration revoked');
}
"#;

const HISTORY_SCRIPT: &str = r#"
function toggleItems(runId) {
  document.getElementById('items-' + runId).classList.toggle('open');
}
async function showDetails(itemId) {
  const modal = document.getElementById('details');
  const set = (id, text) => { document.getElementById(id).textContent = text || '(none)'; };
  let res;
  try {
    res = await fetch('/api/v1/indexing/items/' + itemId + '/details');
  } catch (e) {
    set('details-error', 'Network error: the server could not be reached.');
    set('details-log', ''); set('details-text', '');
    modal.classList.add('open');
    return;
  }
  let body = {};
  try { body = await res.json(); } catch (e) {}
  if (!res.ok) {
    set('details-error', body.error || ('Request failed with status ' + res.status));
    set('details-log', ''); set('details-text', '');
  } else {
    set('details-error', body.item_error);
    set('details-log', body.item_log);
    set('details-text', body.item_extractedtext);
  }
  modal.classList.add('open');
}
function closeDetails() {
  document.getElementById('details').classList.remove('open');
}
"#;

fn page(title: &str, body: &str, script: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n<script>{script}</script>\n</body>\n</html>\n",
        title = escape(title),
    )
}

pub fn integrations_page(panels: &[PanelView]) -> String {
    let mut body = String::from("<h1>Integrations</h1>\n<div class=\"panels\">\n");
    for p in panels {
        let slug = p.provider.as_str();
        let (state, action) = match p.connection {
            Connection::Connected => (
                "Connected",
                format!(
                    "<button onclick=\"revokeIntegration('{slug}')\">Revoke access</button>"
                ),
            ),
            Connection::ConnectedByTeammate => ("Connected by another member", String::new()),
            Connection::NotConnected => ("Not connected", String::new()),
        };
        body.push_str(&format!(
            "<section class=\"panel\" id=\"panel-{slug}\">\n<h2>{name}</h2>\n<p class=\"state\">{state}</p>\n{action}\n<p><a href=\"/integrations/{slug}/history\">Indexing history</a></p>\n<div class=\"alert\" role=\"alert\"></div>\n</section>\n",
            name = escape(p.provider.display_name()),
        ));
    }
    body.push_str("</div>");
    page("Integrations", &body, PANEL_SCRIPT)
}

fn run_badge(status: IndexingStatus) -> String {
    let label = match status {
        IndexingStatus::InProgress => "In progress",
        IndexingStatus::Completed => "Completed",
        IndexingStatus::CompletedWithErrors => "Completed with errors",
        IndexingStatus::Failed => "Failed",
    };
    format!("<span class=\"badge {}\">{}</span>", status.as_str(), label)
}

fn item_badge(status: ItemStatus, error: Option<&str>) -> String {
    let title = error
        .map(|e| format!(" title=\"{}\"", escape(e)))
        .unwrap_or_default();
    format!(
        "<span class=\"badge {cls}\"{title}>{cls}</span>",
        cls = status.as_str()
    )
}

pub fn history_page(provider: Provider, runs: &[RunWithItems]) -> String {
    let name = provider.display_name();
    let mut body = format!(
        "<p><a href=\"/integrations\">&larr; Integrations</a></p>\n<h1>{} indexing history</h1>\n",
        escape(name)
    );
    if runs.is_empty() {
        body.push_str("<p class=\"empty\">No indexing runs yet.</p>\n");
    } else {
        body.push_str(
            "<table>\n<thead><tr><th>Run</th><th>Status</th><th>Started</th><th>Finished</th><th>Items</th><th></th></tr></thead>\n<tbody>\n",
        );
        for r in runs {
            let run = &r.run;
            let error = run
                .error
                .as_deref()
                .map(|e| format!(" title=\"{}\"", escape(e)))
                .unwrap_or_default();
            body.push_str(&format!(
                "<tr{error}><td>#{id}</td><td>{badge}</td><td>{started}</td><td>{finished}</td><td>{count}</td><td><button onclick=\"toggleItems({id})\">Items</button></td></tr>\n",
                id = run.id,
                badge = run_badge(run.status),
                started = escape(&run.started_at),
                finished = escape(run.finished_at.as_deref().unwrap_or("")),
                count = r.items.len(),
            ));
            body.push_str(&format!(
                "<tr class=\"items\" id=\"items-{}\"><td colspan=\"6\">{}</td></tr>\n",
                run.id,
                items_table(r)
            ));
        }
        body.push_str("</tbody>\n</table>\n");
    }
    body.push_str(
        "<div id=\"details\" role=\"dialog\">\n<button onclick=\"closeDetails()\">Close</button>\n<h3>Error</h3><pre id=\"details-error\"></pre>\n<h3>Log</h3><pre id=\"details-log\"></pre>\n<h3>Extracted text</h3><pre id=\"details-text\"></pre>\n</div>",
    );
    page(&format!("{} indexing history", name), &body, HISTORY_SCRIPT)
}

/// Top-level items first, each followed by its children.
fn items_table(run: &RunWithItems) -> String {
    if run.items.is_empty() {
        return "<em>No items recorded.</em>".to_string();
    }
    let mut out = String::from(
        "<table>\n<thead><tr><th>Name</th><th>Type</th><th>Status</th><th></th></tr></thead>\n<tbody>\n",
    );
    let row = |out: &mut String, item: &lorelai_core::model::IndexedItem, child: bool| {
        let indent = if child { "&nbsp;&nbsp;&#8627; " } else { "" };
        out.push_str(&format!(
            "<tr><td>{indent}{name}</td><td>{kind}</td><td>{badge}</td><td><button onclick=\"showDetails({id})\">Details</button></td></tr>\n",
            name = escape(&item.name),
            kind = escape(&item.item_type),
            badge = item_badge(item.status, item.error.as_deref()),
            id = item.id,
        ));
    };
    for parent in run.items.iter().filter(|i| i.parent_item_id.is_none()) {
        row(&mut out, parent, false);
        for child in run
            .items
            .iter()
            .filter(|i| i.parent_item_id == Some(parent.id))
        {
            row(&mut out, child, true);
        }
    }
    out.push_str("</tbody>\n</table>");
    out
}
