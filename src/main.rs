// main.rs — 鱼眼展开查看器: 单次渲染与按键步进交互

use fisheye_viewer::i18n::{self, tr_with};
use fisheye_viewer::session::read_view;
use fisheye_viewer::{MappingEngine, Session, ViewParameters};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use image::io::Reader as ImageReader;
use image::RgbImage;
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fisheye-viewer")]
#[command(about = "Dewarp a region of a fisheye image into a rectified view")]
#[command(version)]
struct Cli {
    /// Message language (falls back to FISHEYE_LANG, then en).
    #[arg(long, global = true)]
    lang: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one view and write it to a file.
    Render(RenderArgs),

    /// Step the view with key commands read from stdin.
    Interactive(InteractiveArgs),
}

#[derive(Debug, Clone, Args)]
struct OutputArgs {
    /// Width of the dewarped view in pixels.
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Height of the dewarped view in pixels.
    #[arg(long, default_value_t = 320)]
    height: u32,

    /// Projection sphere radius in source pixels (default: source width / 2).
    #[arg(long)]
    radius: Option<f32>,
}

#[derive(Debug, Clone, Args)]
struct RenderArgs {
    /// Path to the fisheye source image.
    #[arg(long)]
    input: PathBuf,

    /// Path to write the dewarped image.
    #[arg(long)]
    output: PathBuf,

    /// JSON view preset; explicit angle/zoom flags override it.
    #[arg(long)]
    view: Option<PathBuf>,

    /// Pan angle in degrees.
    #[arg(long, allow_negative_numbers = true)]
    alpha: Option<f32>,

    /// Tilt angle in degrees.
    #[arg(long, allow_negative_numbers = true)]
    beta: Option<f32>,

    /// Roll angle in degrees.
    #[arg(long, allow_negative_numbers = true)]
    theta: Option<f32>,

    /// Zoom factor on the sphere radius.
    #[arg(long, allow_negative_numbers = true)]
    zoom: Option<f32>,

    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Debug, Clone, Args)]
struct InteractiveArgs {
    /// Path to the fisheye source image.
    #[arg(long)]
    input: PathBuf,

    /// Where 's' saves the current view.
    #[arg(long, default_value = "./result.png")]
    output: PathBuf,

    /// Rewrite this image after every step.
    #[arg(long)]
    preview: Option<PathBuf>,

    #[command(flatten)]
    out: OutputArgs,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    i18n::init(i18n::resolve_lang(cli.lang.as_deref()));

    let result = match cli.command {
        Commands::Render(args) => run_render(&args),
        Commands::Interactive(args) => run_interactive(&args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_image(path: &Path) -> Result<RgbImage> {
    let path_str = path.display().to_string();
    let file = File::open(path)
        .with_context(|| tr_with("error.open_file", &[("path", path_str.clone())]))?;

    let mut reader = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .with_context(|| tr_with("error.decode_image", &[("path", path_str.clone())]))?;
    reader.no_limits();
    let img = reader
        .decode()
        .with_context(|| tr_with("error.decode_image", &[("path", path_str)]))?;

    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    info!(
        "{}",
        tr_with("log.source_size", &[("w", w.to_string()), ("h", h.to_string())])
    );
    Ok(rgb)
}

fn build_engine(source: &RgbImage, out: &OutputArgs) -> Result<MappingEngine> {
    let (w, h) = source.dimensions();
    let mut engine = MappingEngine::new(w, h, out.width, out.height)?;
    if let Some(radius) = out.radius {
        engine = engine.with_sphere_radius(radius);
    }
    Ok(engine)
}

fn status_line(view: &ViewParameters) -> String {
    tr_with(
        "status.view",
        &[
            ("alpha", format!("{:.6}", view.alpha)),
            ("beta", format!("{:.6}", view.beta)),
            ("theta", format!("{:.6}", view.theta)),
            ("zoom", format!("{:.6}", view.zoom)),
        ],
    )
}

fn run_render(args: &RenderArgs) -> Result<()> {
    let preset = match &args.view {
        Some(path) => read_view(path)?,
        None => ViewParameters::default(),
    };
    let view = preset.with_overrides(args.alpha, args.beta, args.theta, args.zoom);

    let source = load_image(&args.input)?;
    let mut engine = build_engine(&source, &args.out)?;
    engine.build_map(view, 0)?;
    let result = engine.unwarp(&source, 0)?;
    result
        .save(&args.output)
        .with_context(|| tr_with("error.write_image", &[("path", args.output.display().to_string())]))?;

    println!("{}", status_line(&view));
    info!(
        "{}",
        tr_with("log.rendered", &[("path", args.output.display().to_string())])
    );
    Ok(())
}

fn run_interactive(args: &InteractiveArgs) -> Result<()> {
    let source = load_image(&args.input)?;
    let engine = build_engine(&source, &args.out)?;
    let mut session = Session::new(
        engine,
        &source,
        ViewParameters::initial(),
        args.output.clone(),
        args.preview.clone(),
    )?;

    println!(
        "{}",
        tr_with("howto", &[("output", session.output().display().to_string())])
    );
    println!("{}", status_line(&session.view()));

    session.run(std::io::stdin().lock(), |view| println!("{}", status_line(view)))?;
    Ok(())
}
