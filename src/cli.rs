// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Scanning image files and watched directories
//! - Listing, showing and deleting saved codes
//! - Generating codes to the terminal or a PNG file

use chrono::Local;
use codeshelf::content::ContentKind;
use codeshelf::scanner::{
    DecodeEvent, DirectoryWatchSource, FrameSource, ImageFileSource, ScanListener, StopHandle,
    pipeline_from_config,
};
use codeshelf::{
    Code, CodeFormat, CodeId, CodeRepository, Config, DeleteOutcome, EcLevel, RepositoryListener,
    ScanNotice, generate as generate_code,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Prints decodes and forwards them to the repository when saving
struct PrintingListener {
    save: Option<Arc<RepositoryListener>>,
    decoded: AtomicUsize,
}

impl ScanListener for PrintingListener {
    fn on_decode(&self, event: &DecodeEvent) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
        let kind = ContentKind::classify(&event.content);
        println!(
            "[{}] {} ({})",
            event.format.display_name(),
            event.content,
            kind.action_label()
        );
        if let Some(save) = &self.save {
            save.on_decode(event);
        }
    }

    fn on_permission_denied(&self) {
        eprintln!("Permission denied: cannot read frames");
        if let Some(save) = &self.save {
            save.on_permission_denied();
        }
    }
}

async fn scan_with<S: FrameSource>(
    config: &Config,
    mut source: S,
    save: bool,
    on_start: impl FnOnce(StopHandle),
) -> CliResult {
    let (save_listener, notices) = if save {
        let repository = CodeRepository::open_sqlite(&config.database_path()).await?;
        // The notice channel closes only after the writer has drained
        let (listener, notices, _writer) = RepositoryListener::spawn(repository);
        (Some(listener), Some(notices))
    } else {
        (None, None)
    };

    let listener = Arc::new(PrintingListener {
        save: save_listener,
        decoded: AtomicUsize::new(0),
    });
    let pipeline = pipeline_from_config(config, listener.clone());
    on_start(pipeline.stop_handle());

    let notice_task = notices.map(|notices| tokio::spawn(report_notices(notices)));
    let stats = pipeline.run(&mut source).await;

    let decoded = listener.decoded.load(Ordering::Relaxed);
    // Release every sender so the writer drains and the notice channel closes
    drop(pipeline);
    drop(listener);

    let saved = match notice_task {
        Some(task) => task.await?,
        None => 0,
    };
    let stats = stats?;

    println!();
    println!(
        "Analysed {} frame(s), {} code(s) decoded, {} saved",
        stats.analyzed, decoded, saved
    );
    if stats.failed > 0 {
        println!("{} frame(s) could not be analysed", stats.failed);
    }
    Ok(())
}

async fn report_notices(mut notices: mpsc::UnboundedReceiver<ScanNotice>) -> usize {
    let mut saved = 0;
    while let Some(notice) = notices.recv().await {
        match notice {
            ScanNotice::Saved(code) => {
                saved += 1;
                println!("  saved as #{}", code.id);
            }
            ScanNotice::Failed(e) => eprintln!("  not saved: {}", e),
            ScanNotice::PermissionDenied | ScanNotice::DetectorError(_) => {}
        }
    }
    saved
}

/// Scan image files
pub fn scan(config: &Config, paths: Vec<PathBuf>, save: bool) -> CliResult {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(scan_with(config, ImageFileSource::new(paths), save, |_| {}))
}

/// Watch a directory for new images until Ctrl+C
pub fn watch(config: &Config, dir: PathBuf, include_existing: bool) -> CliResult {
    if !dir.is_dir() {
        return Err(format!("Not a directory: {}", dir.display()).into());
    }

    let mut source = DirectoryWatchSource::new(&dir, config.watch_poll_interval());
    if !include_existing {
        source = source.skip_existing();
    }

    println!("Watching {} (press Ctrl+C to stop)", dir.display());
    let rt = tokio::runtime::Runtime::new()?;
    let mut handler_error = None;
    let result = rt.block_on(scan_with(config, source, true, |handle| {
        if let Err(e) = ctrlc::set_handler(move || handle.stop()) {
            handler_error = Some(e);
        }
    }));

    if let Some(e) = handler_error {
        return Err(e.into());
    }
    result
}

fn print_code_row(code: &Code) {
    let created = code.created_at.with_timezone(&Local);
    println!(
        "{:>5}  {}  {:<7}  {}",
        code.id,
        created.format("%Y-%m-%d %H:%M:%S"),
        code.format.display_name(),
        single_line(&code.content, 60)
    );
}

/// First line of `text`, cut to `max` characters
fn single_line(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    let mut out: String = line.chars().take(max).collect();
    if line.chars().count() > max || text.lines().nth(1).is_some() {
        out.push('…');
    }
    out
}

/// List saved codes
pub fn list(config: &Config, json: bool) -> CliResult {
    let rt = tokio::runtime::Runtime::new()?;
    let codes = rt.block_on(async {
        let repository = CodeRepository::open_sqlite(&config.database_path()).await?;
        Ok::<_, codeshelf::AppError>(repository.codes())
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(codes.as_slice())?);
        return Ok(());
    }

    if codes.is_empty() {
        println!("No saved codes.");
        return Ok(());
    }

    println!("{:>5}  {:<19}  {:<7}  CONTENT", "ID", "CREATED", "FORMAT");
    for code in codes.iter() {
        print_code_row(code);
    }
    Ok(())
}

/// Show one code with its content classification
pub fn show(config: &Config, id: CodeId) -> CliResult {
    let rt = tokio::runtime::Runtime::new()?;
    let code = rt.block_on(async {
        let repository = CodeRepository::open_sqlite(&config.database_path()).await?;
        repository.get(id).await
    })?;

    let Some(code) = code else {
        return Err(format!("No code with id {}", id).into());
    };

    let kind = ContentKind::classify(&code.content);
    println!("ID:      {}", code.id);
    println!("Format:  {}", code.format.display_name());
    println!(
        "Created: {}",
        code.created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    println!("Type:    {} ({})", kind.summary(), kind.action_label());
    println!();
    println!("{}", code.content);
    Ok(())
}

/// Delete one code
pub fn delete(config: &Config, id: CodeId) -> CliResult {
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let repository = CodeRepository::open_sqlite(&config.database_path()).await?;
        repository.delete(id).await
    })?;

    match outcome {
        DeleteOutcome::Deleted => println!("Deleted code {}", id),
        DeleteOutcome::NotFound => println!("No code with id {}", id),
    }
    Ok(())
}

pub struct GenerateArgs {
    pub text: String,
    pub format: Option<CodeFormat>,
    pub output: Option<PathBuf>,
    pub save: bool,
    pub ec_level: Option<EcLevel>,
    pub quiet: bool,
}

/// Generate a code; saving is explicit and only happens after a successful encode
pub fn generate(config: &Config, args: GenerateArgs) -> CliResult {
    let format = args.format.unwrap_or_else(|| config.default_format.clone());
    let mut options = config.generate_options();
    if let Some(ec_level) = args.ec_level {
        options.ec_level = ec_level;
    }

    let matrix = generate_code(&args.text, &format, &options)?;

    if !args.quiet {
        for line in matrix.to_half_blocks(2) {
            println!("{}", line);
        }
        println!();
        println!("{}: {}", format.display_name(), matrix.text());
    }

    if let Some(output) = &args.output {
        matrix.save_png(output, &config.render_options())?;
        println!("Image saved: {}", output.display());
    }

    if args.save {
        let rt = tokio::runtime::Runtime::new()?;
        let code = rt.block_on(async {
            let repository = CodeRepository::open_sqlite(&config.database_path()).await?;
            repository.add(matrix.text(), format).await
        })?;
        println!("Saved as #{}", code.id);
    }

    Ok(())
}

/// Print the effective config, optionally writing it out
pub fn show_config(config: &Config, path: &Path, write: bool) -> CliResult {
    println!("Config file: {}", path.display());
    println!("Database:    {}", config.database_path().display());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);

    if write {
        config.save(path)?;
        println!();
        println!("Written to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_truncates() {
        assert_eq!(single_line("short", 10), "short");
        assert_eq!(single_line("abcdef", 3), "abc…");
        assert_eq!(single_line("one\ntwo", 10), "one…");
    }

    fn temp_config(dir: &Path) -> Config {
        Config {
            database_path: Some(dir.join("codes.db")),
            ..Config::default()
        }
    }

    fn save_args(text: String, ec_level: EcLevel) -> GenerateArgs {
        GenerateArgs {
            text,
            format: Some(CodeFormat::Qr),
            output: None,
            save: true,
            ec_level: Some(ec_level),
            quiet: true,
        }
    }

    fn saved_codes(config: &Config) -> Vec<Code> {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let repository = rt
            .block_on(CodeRepository::open_sqlite(&config.database_path()))
            .unwrap();
        repository.codes().to_vec()
    }

    #[test]
    fn test_generate_over_capacity_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());

        let text = "x".repeat(EcLevel::H.byte_capacity() + 1);
        let err = generate(&config, save_args(text, EcLevel::H)).unwrap_err();
        assert!(err.to_string().contains("1273"), "{}", err);

        // The database is never even opened
        assert!(!config.database_path().exists());
        assert!(saved_codes(&config).is_empty());
    }

    #[test]
    fn test_generate_with_save_stores_encoded_text() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path());

        generate(&config, save_args("shelf 7".into(), EcLevel::M)).unwrap();

        let codes = saved_codes(&config);
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].content, "shelf 7");
        assert_eq!(codes[0].format, CodeFormat::Qr);
    }
}
