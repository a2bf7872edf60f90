//! folio - inspect and edit XHTML content documents

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;

use folio::{Book, CssSelector, EpubVersion, HtmlResource, Resource};

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Inspect and edit XHTML content documents", long_about = None)]
#[command(after_help = "EXAMPLES:
    folio info chapter1.xhtml --json      Show links, language and properties
    folio set-lang chapter1.xhtml he      Set the language (adds dir=\"rtl\")
    folio split chapter1.xhtml            Split at section markers")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// EPUB version of the book the file belongs to
    #[arg(long, global = true, default_value = "3.0")]
    epub_version: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Show linked resources, language and manifest properties
    Info {
        file: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the document language; an empty code removes it
    SetLang { file: String, code: String },
    /// Split at section markers into sibling files
    Split { file: String },
    /// Check XML well-formedness
    Check { file: String },
    /// Remove an embedded style rule by selector and line
    RemoveStyle {
        file: String,
        #[arg(long)]
        selector: String,
        #[arg(long)]
        line: usize,
    },
}

#[derive(Serialize)]
struct Info {
    file: String,
    epub_version: String,
    language: String,
    stylesheets: Vec<String>,
    scripts: Vec<String>,
    linked_resources: Vec<String>,
    manifest_properties: Vec<&'static str>,
    style_rules: usize,
    well_formed: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let version = EpubVersion::from_version_str(&cli.epub_version);
    match run(cli.command, version) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, version: EpubVersion) -> folio::Result<ExitCode> {
    match command {
        Command::Info { file, json } => {
            let (_book, html) = open(&file, version)?;
            show_info(&html, json)
        }
        Command::SetLang { file, code } => {
            let (_book, html) = open(&file, version)?;
            html.set_language_attribute(&code);
            html.save_to_disk(false)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Split { file } => {
            let (book, html) = open(&file, version)?;
            let created = book.split_html(html.book_path())?;
            html.save_to_disk(true)?;
            for new_html in &created {
                new_html.save_to_disk(true)?;
                println!("{}", new_html.full_path().display());
            }
            if created.is_empty() {
                println!("No section markers found");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { file } => {
            let (_book, html) = open(&file, version)?;
            match html.well_formed_error() {
                None => {
                    println!("{file}: well-formed");
                    Ok(ExitCode::SUCCESS)
                }
                Some(err) => {
                    println!("{file}: {err}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::RemoveStyle {
            file,
            selector,
            line,
        } => {
            let (_book, html) = open(&file, version)?;
            if html.delete_css_styles(&[CssSelector::new(selector, line)]) {
                html.save_to_disk(false)?;
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("No matching style rule");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

/// Open a single file as the only HTML resource of a book rooted at its folder.
fn open(file: &str, version: EpubVersion) -> folio::Result<(Arc<Book>, Arc<HtmlResource>)> {
    let path = Path::new(file);
    let folder = path.parent().unwrap_or(Path::new(""));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());

    let book = Book::new(folder, version);
    let html = book.add_html(name);
    html.load_from_disk()?;
    Ok((book, html))
}

fn show_info(html: &HtmlResource, json: bool) -> folio::Result<ExitCode> {
    let info = Info {
        file: html.full_path().display().to_string(),
        epub_version: html.version().to_string(),
        language: html.language_attribute(),
        stylesheets: html.linked_stylesheets(),
        scripts: html.linked_javascripts(),
        linked_resources: html.linked_resources(),
        manifest_properties: html.manifest_properties(),
        style_rules: html.with_text(|text| folio::transform::css::inline_style_selectors(text).len()),
        well_formed: html.is_well_formed(),
    };

    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(out) => println!("{out}"),
            Err(e) => {
                eprintln!("error: {e}");
                return Ok(ExitCode::FAILURE);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!("File: {}", info.file);
    println!("EPUB version: {}", info.epub_version);
    if !info.language.is_empty() {
        println!("Language: {}", info.language);
    }
    if !info.stylesheets.is_empty() {
        println!("Stylesheets: {}", info.stylesheets.join(", "));
    }
    if !info.scripts.is_empty() {
        println!("Scripts: {}", info.scripts.join(", "));
    }
    println!("Linked resources: {}", info.linked_resources.len());
    for path in &info.linked_resources {
        println!("  {path}");
    }
    if !info.manifest_properties.is_empty() {
        println!("Properties: {}", info.manifest_properties.join(" "));
    }
    println!("Style rules: {}", info.style_rules);
    println!("Well-formed: {}", if info.well_formed { "yes" } else { "no" });

    Ok(ExitCode::SUCCESS)
}
