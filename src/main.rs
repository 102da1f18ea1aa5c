#![warn(clippy::unwrap_used)]

use std::io::Read as _;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng as _};
use scribr::{
    analyzer,
    configuration::RenderConfiguration,
    error::{ContextError, ErrorKind},
    font_set::FontSet,
    geometry::{PageFormat, PageSide},
    library::FontLibrary,
    registry::FontRegistry,
    render::{RenderRequest, Renderer},
};

/// The user the fonts belong to when no library is given.
const ANONYMOUS_USER: u64 = 0;

#[derive(Parser)]
#[command(version, long_about = None)]
struct CliArguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print which character sets each font covers, as JSON
    Analyze {
        #[arg(required = true, help = "Paths to the TTF or OTF font files")]
        fonts: Vec<PathBuf>,
    },
    /// Render a text as handwritten notes into a PDF file
    Render(RenderArguments),
}

#[derive(clap::Args)]
struct RenderArguments {
    #[arg(long = "text", help = "Path to the text file, or - to read the standard input")]
    text_path: PathBuf,
    #[arg(
        long = "font",
        help = "Font to register before rendering, the last full Cyrillic one becomes the base font"
    )]
    fonts: Vec<PathBuf>,
    #[arg(long = "library", help = "Path to the JSON font library, created if missing")]
    library_path: Option<PathBuf>,
    #[arg(long = "user", requires = "library_path", help = "User whose fonts are used")]
    user_id: Option<u64>,
    #[arg(long = "format", default_value = "A4", help = "Page format, either A4 or A5")]
    page_format: PageFormat,
    #[arg(long = "grid", help = "Draw the cell grid behind the text")]
    grid_enabled: bool,
    #[arg(
        long = "first-page-side",
        default_value = "right",
        help = "Side of the first page, either left or right"
    )]
    first_page_side: PageSide,
    #[arg(long = "output", help = "Path of the PDF file to write")]
    output_path: PathBuf,
    #[arg(long = "configuration", help = "Path to the JSON render configuration")]
    configuration_path: Option<PathBuf>,
    #[arg(long = "seed", help = "Seed of the font choice, for reproducible documents")]
    seed: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(error) = fallible_main() {
        log::error!("{} ({})", error, error.kind());
        std::process::exit(1);
    }
}

fn fallible_main() -> Result<(), ContextError> {
    match CliArguments::parse().command {
        Command::Analyze { fonts } => {
            let capabilities = fonts
                .iter()
                .map(|font_path| analyzer::analyze(font_path))
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&capabilities)
        }
        Command::Render(arguments) => render(arguments),
    }
}

fn render(arguments: RenderArguments) -> Result<(), ContextError> {
    let configuration = match &arguments.configuration_path {
        Some(configuration_path) => RenderConfiguration::from_path(configuration_path)?,
        None => RenderConfiguration::default(),
    };
    let text = read_text(&arguments.text_path)?;
    let font_set = font_set(&arguments)?;

    let request = RenderRequest {
        text: &text,
        font_set: &font_set,
        page_format: arguments.page_format,
        grid_enabled: arguments.grid_enabled,
        first_page_side: arguments.first_page_side,
    };
    let mut rng = match arguments.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let registry = FontRegistry::new();
    let renderer = Renderer::new(&registry, &configuration);
    let summary = renderer.render_to_file(&request, &arguments.output_path, &mut rng)?;
    log::info!("Saved the document to {:?}", arguments.output_path);

    print_json(&summary)
}

/// Registers the fonts of the command line and returns the font set of the user.
fn font_set(arguments: &RenderArguments) -> Result<FontSet, ContextError> {
    let library = match &arguments.library_path {
        Some(library_path) if library_path.exists() => FontLibrary::load(library_path)?,
        _ => FontLibrary::new(),
    };
    let user_id = arguments.user_id.unwrap_or(ANONYMOUS_USER);

    for font_path in &arguments.fonts {
        let outcome = library.register_font(user_id, font_path)?;
        log::debug!("Registration of {:?}: {:?}", font_path, outcome);
    }
    if let Some(library_path) = &arguments.library_path {
        library.save(library_path)?;
    }

    for progress in library.requirement_progress(user_id) {
        if !progress.is_met() {
            log::info!(
                "User {} has {} of the {} suggested {} fonts",
                user_id,
                progress.current,
                progress.required,
                progress.font_type
            );
        }
    }

    Ok(library.fonts_for_user(user_id))
}

fn read_text(text_path: &Path) -> Result<String, ContextError> {
    if text_path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).map_err(|error| {
            ContextError::with_error(ErrorKind::Validation, "Unable to read the standard input", &error)
        })?;
        return Ok(text);
    }

    std::fs::read_to_string(text_path).map_err(|error| {
        ContextError::with_error(
            ErrorKind::Validation,
            format!("Unable to read the text file {:?}", text_path),
            &error,
        )
    })
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), ContextError> {
    let json = serde_json::to_string_pretty(value).map_err(|error| {
        ContextError::with_error(ErrorKind::Backend, "Unable to serialize the output", &error)
    })?;
    println!("{}", json);
    Ok(())
}
