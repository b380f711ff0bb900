use anyhow::{Context, Result, bail, format_err};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use dialoguer::Confirm;
use indoc::indoc;
use log::{Level, info};
use serde::Serialize;

use dtb::{
    DecodeResult, DeviceTree, FdtHeader, FdtParser, FdtVisitor, OwnedFdtEvent, ParserSettings,
    ReservationEntry, TreeBuilder,
};

use std::borrow::Cow;
use std::fmt::Write as FmtWrite;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum DtbOutputFormat {
    Text,
    Json,
    Events,
}

struct DtbDump {
    parser_settings: ParserSettings,
    inputs: Vec<PathBuf>,
    output_format: DtbOutputFormat,
    output: Box<dyn Write + Send + Sync>,
    num_threads: usize,
    verbosity_level: Option<Level>,
}

/// Everything printed for a single input, rendered ahead of time so inputs can be decoded in
/// parallel and still be printed in the order they were given.
struct Dumped {
    input: PathBuf,
    rendered: String,
    failure: Option<String>,
}

#[derive(Serialize)]
struct JsonError {
    kind: String,
    offset: u64,
    message: String,
}

#[derive(Serialize)]
struct JsonDump<'a> {
    input: String,
    valid: bool,
    header: Option<FdtHeader>,
    reservations: &'a [ReservationEntry],
    tree: &'a DeviceTree,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonError>,
}

impl DtbDump {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let inputs: Vec<PathBuf> = matches
            .get_many::<String>("INPUT")
            .ok_or_else(|| format_err!("This is a required argument"))?
            .map(PathBuf::from)
            .collect();

        let output_format = match matches
            .get_one::<String>("output-format")
            .map(String::as_str)
            .unwrap_or("text")
        {
            "json" => DtbOutputFormat::Json,
            "events" => DtbOutputFormat::Events,
            _ => DtbOutputFormat::Text,
        };

        let num_threads = *matches.get_one::<usize>("num-threads").unwrap_or(&0);
        let num_threads = match (cfg!(feature = "multithreading"), num_threads) {
            (true, number) => number,
            (false, 0 | 1) => 1,
            (false, _) => {
                eprintln!(
                    "turned on threads, but library was compiled without `multithreading` feature! using fallback sync iterator"
                );
                1
            }
        };

        let verbosity_level = match matches.get_count("verbose") {
            0 => None,
            1 => Some(Level::Info),
            2 => Some(Level::Debug),
            3 => Some(Level::Trace),
            _ => {
                eprintln!("using more than  -vvv does not affect verbosity level");
                Some(Level::Trace)
            }
        };

        let mut parser_settings = ParserSettings::new();
        if let Some(version) = matches.get_one::<u32>("min-version") {
            parser_settings = parser_settings.minimum_version(*version);
        }
        if let Some(version) = matches.get_one::<u32>("supported-version") {
            parser_settings = parser_settings.supported_version(*version);
        }

        let output: Box<dyn Write + Send + Sync> = match matches.get_one::<String>("output-target") {
            Some(path) => {
                let prompt = !matches.get_flag("no-confirm-overwrite");
                let file = Self::create_output_file(path, prompt).with_context(|| {
                    format!("An error occurred while creating output file at `{path}`")
                })?;
                Box::new(file)
            }
            None => Box::new(io::stdout()),
        };

        Ok(DtbDump {
            parser_settings,
            inputs,
            output_format,
            output,
            num_threads,
            verbosity_level,
        })
    }

    /// Main entry point for `DtbDump`. Returns `true` if every input decoded cleanly.
    pub fn run(&mut self) -> Result<bool> {
        self.try_to_initialize_logging();

        let dumped = self.dump_all()?;
        let mut all_valid = true;

        for dumped in dumped {
            self.output
                .write_all(dumped.rendered.as_bytes())
                .context("failed to write output")?;

            if let Some(failure) = dumped.failure {
                all_valid = false;
                eprintln!("{}: {}", dumped.input.display(), failure);
            }
        }

        self.output.flush().context("failed to flush output")?;

        Ok(all_valid)
    }

    #[cfg(feature = "multithreading")]
    fn dump_all(&self) -> Result<Vec<Dumped>> {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .context("failed to start decode worker threads")?;

        pool.install(|| {
            self.inputs
                .par_iter()
                .map(|input| self.dump_input(input))
                .collect()
        })
    }

    #[cfg(not(feature = "multithreading"))]
    fn dump_all(&self) -> Result<Vec<Dumped>> {
        self.inputs
            .iter()
            .map(|input| self.dump_input(input))
            .collect()
    }

    /// Inputs that can't be opened or decoded are reported in the returned `Dumped`. Only output
    /// that can't be rendered at all is an error.
    fn dump_input(&self, input: &Path) -> Result<Dumped> {
        let parser = match Self::open(input) {
            Ok(parser) => parser.with_configuration(self.parser_settings.clone()),
            Err(e) => {
                return Ok(Dumped {
                    input: input.to_path_buf(),
                    rendered: String::new(),
                    failure: Some(format!("{e:#}")),
                });
            }
        };

        info!("decoding {} ({} bytes)", input.display(), parser.data().len());

        let (rendered, result) = match self.output_format {
            DtbOutputFormat::Text => self.render_text(input, &parser),
            DtbOutputFormat::Json => Self::render_json(input, &parser)?,
            DtbOutputFormat::Events => Self::render_events(&parser)?,
        };

        let failure = result.error().map(|e| {
            format!(
                "{} at offset {} (0x{:x}): {}",
                e.kind(),
                e.offset(),
                e.offset(),
                e
            )
        });

        Ok(Dumped {
            input: input.to_path_buf(),
            rendered,
            failure,
        })
    }

    /// `-` reads the blob from stdin.
    fn open(input: &Path) -> Result<FdtParser> {
        if input.as_os_str() == "-" {
            let mut data = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut data)
                .context("failed to read blob from stdin")?;
            return Ok(FdtParser::from_buffer(data));
        }

        Ok(FdtParser::from_path(input)?)
    }

    fn render_text(&self, input: &Path, parser: &FdtParser) -> (String, DecodeResult) {
        let mut out = String::new();

        if self.inputs.len() > 1 {
            let _ = writeln!(out, "// {}", input.display());
        }

        // Reservations come first, but the text visitor streams nodes as they are decoded.
        let mut nodes = String::new();
        let result = parser.decode(&mut TextRenderer::new(&mut nodes));

        for entry in &result.reservations {
            let _ = writeln!(out, "/memreserve/ 0x{:016x} 0x{:016x};", entry.address, entry.size);
        }
        out.push_str(&nodes);

        (out, result)
    }

    fn render_json(input: &Path, parser: &FdtParser) -> Result<(String, DecodeResult)> {
        let mut builder = TreeBuilder::new();
        let result = parser.decode(&mut builder);
        let tree = builder.finish();

        let dump = JsonDump {
            input: input.to_string_lossy().into_owned(),
            valid: result.is_valid(),
            header: result.header,
            reservations: &result.reservations,
            tree: &tree,
            error: result.error().map(|e| JsonError {
                kind: e.kind().to_string(),
                offset: e.offset(),
                message: e.to_string(),
            }),
        };

        let mut out = serde_json::to_string_pretty(&dump)
            .with_context(|| format!("failed to serialize `{}` as JSON", input.display()))?;
        out.push('\n');

        Ok((out, result))
    }

    fn render_events(parser: &FdtParser) -> Result<(String, DecodeResult)> {
        let mut events: Vec<OwnedFdtEvent> = Vec::new();
        let result = parser.decode(&mut events);

        let mut out = String::new();
        for event in &events {
            let line = serde_json::to_string(event).context("failed to serialize event")?;
            out.push_str(&line);
            out.push('\n');
        }

        Ok((out, result))
    }

    /// If `prompt` is passed, will display a confirmation prompt before overwriting files.
    fn create_output_file(path: impl AsRef<Path>, prompt: bool) -> Result<File> {
        let p = path.as_ref();

        if p.is_dir() {
            bail!(
                "There is a directory at {}, refusing to overwrite",
                p.display()
            );
        }

        if p.exists() {
            if prompt {
                let confirmed = Confirm::new()
                    .with_prompt(format!(
                        "Are you sure you want to override output file at {}",
                        p.display()
                    ))
                    .default(false)
                    .interact()
                    .context("Failed to write confirmation prompt to term")?;

                if !confirmed {
                    bail!("Cancelled");
                }
            }

            return Ok(File::create(p)?);
        }

        // Ok to assume p is not an existing directory
        match p.parent() {
            Some(parent) => {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
                Ok(File::create(p)?)
            }
            None => bail!("Output file cannot be root."),
        }
    }

    fn try_to_initialize_logging(&self) {
        if let Some(level) = self.verbosity_level {
            if let Err(e) = simplelog::TermLogger::init(
                level.to_level_filter(),
                simplelog::Config::default(),
                simplelog::TerminalMode::Stderr,
                simplelog::ColorChoice::Auto,
            ) {
                eprintln!("Failed to initialize logging: {e:?}");
            }
        }
    }
}

/// Renders the tree as indented text while it is being decoded.
///
/// Property values are printed as raw bytes, since their meaning depends on bindings that the
/// decoder knows nothing about.
struct TextRenderer<'a> {
    out: &'a mut String,
    depth: usize,
}

impl<'a> TextRenderer<'a> {
    fn new(out: &'a mut String) -> Self {
        TextRenderer { out, depth: 0 }
    }

    fn indent(&self) -> usize {
        self.depth * 4
    }
}

impl FdtVisitor for TextRenderer<'_> {
    fn begin_node(&mut self, name: &[u8]) {
        let name = match name {
            b"" if self.depth == 0 => Cow::Borrowed("/"),
            _ => String::from_utf8_lossy(name),
        };
        let _ = writeln!(self.out, "{:indent$}{} {{", "", name, indent = self.indent());
        self.depth += 1;
    }

    fn end_node(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        let _ = writeln!(self.out, "{:indent$}}};", "", indent = self.indent());
    }

    fn insert_property(&mut self, name: &[u8], value: &[u8]) {
        let name = String::from_utf8_lossy(name);

        if value.is_empty() {
            let _ = writeln!(self.out, "{:indent$}{};", "", name, indent = self.indent());
            return;
        }

        let bytes: Vec<String> = value.iter().map(|b| format!("0x{b:02X}")).collect();
        let _ = writeln!(
            self.out,
            "{:indent$}{} = <{}>;",
            "",
            name,
            bytes.join(" "),
            indent = self.indent()
        );
    }
}

fn command() -> Command {
    Command::new("dtb_dump")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility to decode flattened device tree blobs")
        .arg(
            Arg::new("INPUT")
                .required(true)
                .num_args(1..)
                .action(ArgAction::Append)
                .help("Device tree blob(s) to decode. Pass `-` to read from stdin."),
        )
        .arg(
            Arg::new("num-threads")
                .short('t')
                .long("threads")
                .default_value("0")
                .value_parser(value_parser!(usize))
                .help("Sets the number of worker threads, defaults to number of CPU cores."),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("format")
                .value_parser(["text", "json", "events"])
                .default_value("text")
                .help("Sets the output format")
                .long_help(indoc!(
                    r#"
                    Sets the output format:
                        "text"   - prints an indented tree, with property values as hex bytes.
                        "json"   - prints the header, memory reservations and the decoded tree.
                        "events" - prints one JSON object per decoded event.
                    "#
                )),
        )
        .arg(
            Arg::new("output-target")
                .long("output")
                .short('f')
                .action(ArgAction::Set)
                .help(indoc!("Writes output to the file specified instead of stdout, errors will still be printed to stderr.
                       Will ask for confirmation before overwriting files, to allow overwriting, pass `--no-confirm-overwrite`
                       Will create parent directories if needed.")),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help(indoc!("When set, will not ask for confirmation before overwriting files, useful for automation")),
        )
        .arg(
            Arg::new("min-version")
                .long("min-version")
                .value_parser(value_parser!(u32))
                .help("Oldest format version to accept (default 16)."),
        )
        .arg(
            Arg::new("supported-version")
                .long("supported-version")
                .value_parser(value_parser!(u32))
                .help("Newest format version blobs may require (default 17)."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help(indoc!("Sets debug prints level for the application:
                    -v   - info
                    -vv  - debug
                    -vvv - trace
                    NOTE: trace output is only available in debug builds, as it is extremely verbose.")),
        )
}

fn main() -> Result<()> {
    let matches = command().get_matches();

    let mut app = match DtbDump::from_cli_matches(&matches) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("{e:#}");
            exit(1);
        }
    };

    if !app.run()? {
        exit(1);
    }

    Ok(())
}
