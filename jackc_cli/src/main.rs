use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use codesnake::{Block, CodeWidth, Label, LineIndex};
use jackc::{compile, CompileError, LexerError, Span, Token};
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use yansi::Paint;

#[derive(Parser)]
#[command(name = "jackc", version, about = "Compile Jack classes into VM code")]
struct Cli {
    /// More logging: -v for debug, -vv for every emitted instruction
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile `.jack` files, or every `.jack` file in a directory
    Compile {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Write `.vm` files here instead of next to their sources
        #[arg(short, long, conflicts_with = "stdout")]
        out_dir: Option<PathBuf>,
        /// Print the VM code instead of writing files
        #[arg(long)]
        stdout: bool,
    },
    /// Show how a file is split into tokens
    Tokens { file: PathBuf },
}

enum Output {
    BesideSource,
    Directory(PathBuf),
    Stdout,
}

fn make_block<'a>(
    idx: &'a LineIndex,
    labels: impl IntoIterator<Item = (Span, Result<Token, LexerError>)>,
) -> Option<Block<&'a str, String>> {
    Block::new(
        idx,
        labels.into_iter().map(|(range, tok)| {
            let text = match &tok {
                Ok(token) => token.to_string().green().to_string(),
                Err(err) => err.to_string().red().to_string(),
            };
            Label::new(range)
                .with_text(text)
                .with_style(move |s| match tok {
                    Ok(Token::Keyword(_)) => s.magenta().to_string(),
                    Ok(Token::Identifier(_)) => s.blue().to_string(),
                    Ok(Token::IntegerConstant(_)) => s.yellow().to_string(),
                    Ok(Token::StringConstant(_)) => s.cyan().to_string(),
                    Ok(_) => s,
                    Err(_) => s.red().to_string(),
                })
        }),
    )
}

fn print_blocks<'a>(path: &Path, blocks: impl IntoIterator<Item = Option<Block<&'a str, String>>>) {
    for block in blocks
        .into_iter()
        .filter_map(|blk| Some(blk?.map_code(|c| CodeWidth::new(c, c.len()))))
    {
        eprintln!("{}[{}]", block.prologue(), path.display());
        eprint!("{block}");
        eprintln!("{}", block.epilogue());
    }
}

/// Labels the whole token stream, one block per source line.
fn show_tokens(path: &Path) -> anyhow::Result<()> {
    let source =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let idx = LineIndex::new(&source);

    let mut blocks = vec![];
    let mut line_labels = vec![];
    let mut line = 0;
    for (token, span) in Token::lexer(&source).spanned() {
        let token_line = source[..span.start].matches('\n').count();
        if token_line != line && !line_labels.is_empty() {
            blocks.push(make_block(&idx, line_labels.drain(..)));
        }
        line = token_line;
        line_labels.push((span, token));
    }

    if !line_labels.is_empty() {
        blocks.push(make_block(&idx, line_labels.drain(..)));
    }

    print_blocks(path, blocks);
    Ok(())
}

fn report_error(path: &Path, source: &str, err: &CompileError) {
    let mut span = err.span();
    // Point at the last character when the error is at the end of input
    if span.is_empty() {
        span.start = source[..span.start]
            .char_indices()
            .next_back()
            .map_or(0, |(i, _)| i);
    }
    if span.is_empty() {
        eprintln!("{}: {err}", path.display());
        return;
    }

    let idx = LineIndex::new(source);
    let label = Label::new(span)
        .with_text(err.to_string().red().to_string())
        .with_style(|s| s.red().bold().to_string());
    print_blocks(path, [Block::new(&idx, [label])]);
}

fn compile_file(path: &Path, output: &Output) -> anyhow::Result<()> {
    let source =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let unit = match compile(&source) {
        Ok(unit) => unit,
        Err(err) => {
            report_error(path, &source, &err);
            bail!("{}: {err}", path.display());
        }
    };

    let stem = path.file_stem().unwrap_or_default();
    if stem.to_str() != Some(&*unit.class_name) {
        warn!(
            "class {} is declared in {}",
            unit.class_name,
            path.display()
        );
    }

    let target = match output {
        Output::Stdout => {
            print!("{}", unit.code);
            return Ok(());
        }
        Output::BesideSource => path.with_extension("vm"),
        Output::Directory(dir) => dir.join(stem).with_extension("vm"),
    };
    fs::write(&target, &unit.code).with_context(|| format!("writing {}", target.display()))?;
    info!("compiled {} -> {}", path.display(), target.display());
    Ok(())
}

fn is_jack_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "jack")
}

/// Expands directories into their `.jack` files, sorted by name.
fn collect_sources(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut sources = vec![];
    for path in paths {
        if path.is_dir() {
            let mut found = fs::read_dir(path)
                .with_context(|| format!("listing {}", path.display()))?
                .filter_map(|entry| Some(entry.ok()?.path()))
                .filter(|p| is_jack_file(p))
                .collect::<Vec<_>>();
            found.sort();
            if found.is_empty() {
                warn!("no .jack files in {}", path.display());
            }
            sources.extend(found);
        } else if is_jack_file(path) {
            sources.push(path.clone());
        } else {
            bail!("{} is neither a .jack file nor a directory", path.display());
        }
    }
    Ok(sources)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new().with_level(level).env().init()?;

    match cli.command {
        Command::Compile {
            paths,
            out_dir,
            stdout,
        } => {
            let output = match (out_dir, stdout) {
                (_, true) => Output::Stdout,
                (Some(dir), false) => {
                    fs::create_dir_all(&dir)
                        .with_context(|| format!("creating {}", dir.display()))?;
                    Output::Directory(dir)
                }
                (None, false) => Output::BesideSource,
            };

            let sources = collect_sources(&paths)?;
            if sources.is_empty() {
                bail!("nothing to compile");
            }

            // Classes are independent, so one failure does not stop the rest
            let mut failed = 0;
            for path in &sources {
                if let Err(err) = compile_file(path, &output) {
                    error!("{err:#}");
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{failed} of {} classes failed to compile", sources.len());
            }
        }
        Command::Tokens { file } => show_tokens(&file)?,
    }

    Ok(())
}
