//! qrseal CLI - Password-encrypted text carried in QR codes
//!
//! `encrypt` turns a text file into an armored token and, optionally, a PNG
//! QR code. `decrypt` takes the token from the command line, a file, a QR
//! image, or a directory of captured frames.

use clap::{Args, Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use tracing::{debug, info, warn};

use qrseal::capture::{CaptureOutcome, CaptureSession, DirectoryCamera};
use qrseal::cipher::SecretboxCipher;
use qrseal::config::Settings;
use qrseal::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use qrseal::export;
use qrseal::flow::{DecryptFlow, EncryptFlow, FlowStatus};
use qrseal::password::{
    CachingPasswordReader, PasswordReader, ReaderPasswordReader, TerminalPasswordReader,
};
use qrseal::payload::{DEFAULT_TEXT_MIME, FilePayload};
use qrseal::qr::QrEncoder;
use qrseal::secretcrypt::{KdfParams, MAX_LOG_N};
use qrseal::session::{Mode, Session, TokenSource};

#[derive(Parser)]
#[command(name = "qrseal")]
#[command(version)]
#[command(about = "Password-encrypted text carried in QR codes.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// Log flow steps to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a text file into a token and QR code
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Keep the file name and type with the text (experimental)
        #[arg(long)]
        as_file: bool,

        /// Media type recorded with --as-file
        #[arg(long, value_name = "TYPE", requires = "as_file")]
        mime: Option<String>,

        /// File or directory to save the token to instead of printing it
        #[arg(short, long, value_name = "TOKEN_FILE")]
        output: Option<PathBuf>,

        /// File or directory to save the QR code to, as PNG
        #[arg(long, value_name = "PNG")]
        qr: Option<PathBuf>,

        /// scrypt cost as log2(N)
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(1..=MAX_LOG_N as i64))]
        kdf_log_n: Option<u8>,
    },

    /// Decrypt a token
    #[command(alias = "d")]
    Decrypt {
        #[command(flatten)]
        source: TokenArgs,

        /// Directory to save the decrypted content to instead of printing it
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct TokenArgs {
    /// The token itself
    #[arg(long, value_name = "TEXT")]
    token: Option<String>,

    /// Path to a file holding the token
    #[arg(short, long, value_name = "TOKEN_FILE")]
    input: Option<PathBuf>,

    /// Path to an image of the QR code
    #[arg(long, value_name = "IMG")]
    qr_image: Option<PathBuf>,

    /// Directory of camera frames, scanned in name order
    #[arg(long, value_name = "DIR")]
    scan_frames: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut reader = get_password_reader(cli.passphrase_stdin);
    let result = match cli.command {
        Commands::Encrypt {
            input,
            as_file,
            mime,
            output,
            qr,
            kdf_log_n,
        } => {
            let mut settings = Settings::default();
            if let Some(log_n) = kdf_log_n {
                settings.kdf = KdfParams::new(log_n, settings.kdf.r, settings.kdf.p);
            }
            let options = EncryptOptions {
                input,
                as_file,
                mime,
                output,
                qr,
            };
            encrypt(&settings, &options, &mut *reader)
        }
        Commands::Decrypt { source, output } => {
            let settings = Settings::default();
            decrypt(&settings, source, output.as_deref(), &mut *reader).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn get_password_reader(use_stdin: bool) -> Box<dyn PasswordReader> {
    if use_stdin {
        // stdin is read once; the confirmation prompt gets the same value.
        Box::new(CachingPasswordReader::new(Box::new(
            ReaderPasswordReader::new(Box::new(io::stdin())),
        )))
    } else {
        Box::new(TerminalPasswordReader::new())
    }
}

struct EncryptOptions {
    input: PathBuf,
    as_file: bool,
    mime: Option<String>,
    output: Option<PathBuf>,
    qr: Option<PathBuf>,
}

fn encrypt(
    settings: &Settings,
    options: &EncryptOptions,
    reader: &mut dyn PasswordReader,
) -> Result<()> {
    let text = fs::read_to_string(&options.input).map_err(|e| read_error(&options.input, e))?;

    let mut session = Session::new(settings.notice_ttl);
    if options.as_file {
        let name = options
            .input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = options.mime.as_deref().unwrap_or(DEFAULT_TEXT_MIME);
        session.encrypt.set_file(FilePayload::new(name, mime, text));
    } else {
        session.encrypt.set_text(text);
    }
    session.encrypt.password = reader.read_password("Password: ")?;
    session.encrypt.confirmation = reader.read_password("Confirm password: ")?;

    let flow = EncryptFlow::new(
        Arc::new(SecretboxCipher::new(settings.kdf)),
        QrEncoder::new(settings.qr),
    );
    let status = flow.run(&mut session);
    check_status(&session, status)?;
    let Some(result) = session.encrypted() else {
        return Err(QrsealError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "encrypt flow completed without a result",
        ));
    };

    // Save failures are reported at the end so every other result still
    // gets out.
    let mut first_failure = None;

    match &options.output {
        Some(path) => {
            let (dir, name) = split_target(path, &settings.token_file_name);
            let token_line = format!("{}\n", result.token);
            if let Err(e) = export::save_artifact(&dir, &name, token_line.as_bytes()) {
                warn!(error = %e, "could not save token, printing it instead");
                println!("{}", result.token);
                first_failure = first_failure.or(Some(e));
            }
        }
        None => println!("{}", result.token),
    }

    if let Some(path) = &options.qr {
        let saved = match &result.qr {
            Some(image) => image.to_png().and_then(|png| {
                let (dir, name) = split_target(path, &settings.qr_file_name);
                export::save_artifact(&dir, &name, &png)
            }),
            None => Err(notice_failure(&session)),
        };
        if let Err(e) = saved {
            warn!(error = %e, "QR code not saved");
            first_failure = first_failure.or(Some(e));
        }
    } else if result.qr.is_none() {
        warn!("{}", notice_failure(&session));
    }

    report_notices(&session);
    first_failure.map_or(Ok(()), Err)
}

async fn decrypt(
    settings: &Settings,
    source: TokenArgs,
    output: Option<&Path>,
    reader: &mut dyn PasswordReader,
) -> Result<()> {
    let mut session = Session::new(settings.notice_ttl);
    session.switch_mode(Mode::Decrypt);

    let loaded = if let Some(token) = source.token {
        session.decrypt.set_token(TokenSource::Typed, token);
        true
    } else if let Some(path) = source.input {
        let token = fs::read_to_string(&path).map_err(|e| read_error(&path, e))?;
        session.decrypt.set_token(TokenSource::Typed, token);
        true
    } else if let Some(path) = source.qr_image {
        DecryptFlow::load_image_file(&mut session, &path)
    } else if let Some(dir) = source.scan_frames {
        let outcome = scan_frames(settings, dir).await;
        if matches!(outcome, CaptureOutcome::Cancelled) {
            return Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::CaptureCancelled,
                "scan cancelled",
            ));
        }
        DecryptFlow::accept_capture(&mut session, outcome)
    } else {
        false
    };
    if !loaded {
        return Err(notice_failure(&session));
    }

    session.decrypt.password = reader.read_password("Password: ")?;

    let flow = DecryptFlow::new(Arc::new(SecretboxCipher::new(settings.kdf)));
    let status = flow.run(&mut session);
    check_status(&session, status)?;
    let Some(payload) = session.decrypted() else {
        return Err(QrsealError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "decrypt flow completed without a result",
        ));
    };

    let mut first_failure = None;
    if let Some(dir) = output {
        match export::save_artifact(dir, payload.name(), payload.content().as_bytes()) {
            Ok(path) => info!(path = %path.display(), "saved decrypted content"),
            Err(e) => {
                warn!(error = %e, "could not save decrypted content, printing it instead");
                first_failure = Some(e);
            }
        }
    }
    if output.is_none() || first_failure.is_some() {
        write_stdout(payload.content().as_bytes())?;
    }

    report_notices(&session);
    first_failure.map_or(Ok(()), Err)
}

/// Exit status for a run interrupted by Ctrl-C.
const INTERRUPTED: i32 = 130;

/// Replay captured frames until one decodes. Ctrl-C cancels the scan.
///
/// Listening for Ctrl-C replaces the default SIGINT behavior for the rest of
/// the process, so once the scan is over a second listener takes over and
/// exits the way an unhandled Ctrl-C would.
async fn scan_frames(settings: &Settings, dir: PathBuf) -> CaptureOutcome {
    let handle =
        CaptureSession::from_settings(settings).start(Arc::new(DirectoryCamera::new(dir)));
    let cancel = handle.cancellation_token();
    let finish = handle.finish();
    tokio::pin!(finish);

    let outcome = tokio::select! {
        outcome = &mut finish => outcome,
        interrupted = tokio::signal::ctrl_c() => {
            if interrupted.is_ok() {
                debug!("scan interrupted");
                cancel.cancel();
            }
            finish.await
        }
    };

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            process::exit(INTERRUPTED);
        }
    });
    outcome
}

fn check_status(session: &Session, status: FlowStatus) -> Result<()> {
    match status {
        FlowStatus::Completed => Ok(()),
        FlowStatus::Rejected => match session.validation() {
            Some(invalid) => Err(invalid.clone().into()),
            None => Err(notice_failure(session)),
        },
        FlowStatus::Failed => Err(notice_failure(session)),
    }
}

/// The current error notice as an error.
fn notice_failure(session: &Session) -> QrsealError {
    let message = session
        .notices
        .current_error()
        .map_or("operation failed", |notice| notice.message.as_str());
    QrsealError::new(ErrorCategory::User, message)
}

fn report_notices(session: &Session) {
    if let Some(notice) = session.notices.current_success() {
        info!("{}", notice.message);
    }
}

/// A target given on the command line is either a directory, which gets the
/// default name, or a file path.
fn split_target(path: &Path, default_name: &str) -> (PathBuf, String) {
    if path.is_dir() {
        return (path.to_path_buf(), default_name.to_owned());
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| default_name.to_owned());
    (dir, name)
}

fn write_stdout(contents: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(contents)
        .and_then(|()| stdout.flush())
        .map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to write to stdout",
                e,
            )
        })
}

fn read_error(path: &Path, err: io::Error) -> QrsealError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    QrsealError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
