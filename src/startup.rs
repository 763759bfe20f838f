//! Command entry points for the binary.
//!
//! Builds the [`AppState`], resolves the session and runs one command
//! against the receipt service.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ConfigV1;
use crate::error::ApiError;
use crate::models::{AccessCredential, Receipt, ReceiptFilter};
use crate::state::AppState;
use crate::upload::{UploadFile, UploadTask, UploadTaskId};

/// Seeds the credential store when the operator already holds a token.
pub const ACCESS_TOKEN_ENV: &str = "TAXTRACKER_ACCESS_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Whoami,
    Upload(Vec<PathBuf>),
    Receipts(Option<i32>),
}

/// Runs one command to completion.
///
/// # Errors
///
/// Returns an error when the session is not authenticated, a file cannot be
/// read, or the service rejects a request. Individual upload failures are
/// reported per row and only fail the whole command when none succeeded.
pub async fn run(config: Arc<ConfigV1>, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::build(config)?;
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        let credential = AccessCredential::new(token);
        if credential.as_str().is_empty() || credential.header_value().is_none() {
            warn!("Ignoring {}: not a usable bearer token", ACCESS_TOKEN_ENV);
        } else {
            state.credentials.set(credential);
        }
    }

    let auth = state.session.bootstrap().await;
    info!("Session resolved: {:?}", auth.status);
    if !state.session.is_authenticated() {
        eprintln!("Not signed in. Log in at {}", state.session.login_redirect());
        return Err(ApiError::Unauthorized.into());
    }

    match command {
        Command::Whoami => whoami(&state),
        Command::Upload(paths) => upload(&state, paths).await,
        Command::Receipts(year) => receipts(&state, year).await,
    }
}

fn whoami(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    match state.session.profile() {
        Some(profile) => {
            println!("{}", profile.display_name());
            if let Some(email) = &profile.email {
                println!("email: {}", email);
            }
        }
        None => println!("authenticated"),
    }
    Ok(())
}

async fn upload(state: &AppState, paths: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    if paths.is_empty() {
        return Err("upload needs at least one file".into());
    }
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(UploadFile::from_path(path).await?);
    }

    let mut rows = state.uploads.subscribe();
    let ids = state.uploads.submit(files);
    let mut printed: Vec<(UploadTaskId, String)> = Vec::new();

    loop {
        let snapshot: Vec<UploadTask> = rows.borrow_and_update().clone();
        for task in &snapshot {
            render_row(task, &mut printed);
        }
        if snapshot.iter().all(|t| t.status.is_terminal()) {
            break;
        }
        if rows.changed().await.is_err() {
            break;
        }
    }

    let accepted = state.uploads.refresh_signal();
    info!("{} of {} uploads accepted", accepted, ids.len());
    if accepted == 0 {
        return Err("no upload succeeded".into());
    }
    if (accepted as usize) < ids.len() {
        warn!("{} uploads failed", ids.len() - accepted as usize);
    }
    receipts(state, None).await
}

/// Prints a row only when its label moved, so a 16ms ramp stays readable.
fn render_row(task: &UploadTask, printed: &mut Vec<(UploadTaskId, String)>) {
    let label = task.status_label();
    match printed.iter_mut().find(|(id, _)| id == &task.id) {
        Some((_, last)) if *last == label => return,
        Some((_, last)) => *last = label.clone(),
        None => printed.push((task.id.clone(), label.clone())),
    }
    println!("{:<40} {:>10}  {}", task.name(), task.size_label, label);
}

async fn receipts(state: &AppState, year: Option<i32>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = year.map(ReceiptFilter::year).unwrap_or_default();
    let receipts = state.receipts.list_receipts(filter).await?;
    if receipts.is_empty() {
        println!("no receipts");
    }
    for receipt in &receipts {
        println!("{}", receipt_line(receipt));
    }
    if let Some(year) = year {
        let totals = state.receipts.total_claims(year).await?;
        println!(
            "{}: {} receipts, total claims {:.2}",
            totals.year, totals.num_receipts, totals.total_claims
        );
    }
    Ok(())
}

fn receipt_line(receipt: &Receipt) -> String {
    format!(
        "{}  {}  {}  {}",
        receipt.receipt_id,
        receipt.receipt_filename.as_deref().unwrap_or("-"),
        receipt.receipt_status.as_deref().unwrap_or("-"),
        receipt.receipt_upload_datetime.as_deref().unwrap_or("-"),
    )
}

/// Parses `whoami`, `upload <files…>` and `receipts [year]`.
pub fn parse_command<I>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    match args.next().as_deref() {
        Some("whoami") => Ok(Command::Whoami),
        Some("upload") => Ok(Command::Upload(args.map(PathBuf::from).collect())),
        Some("receipts") => match args.next() {
            None => Ok(Command::Receipts(None)),
            Some(year) => year
                .parse()
                .map(|y| Command::Receipts(Some(y)))
                .map_err(|_| format!("invalid year '{}'", year)),
        },
        Some(other) => Err(format!("unknown command '{}'", other)),
        None => Err("missing command".to_string()),
    }
}
