// ============================================================================
// GenCanvas CLI — headless viewport automation via command-line arguments
// ============================================================================
//
// Usage examples:
//   gencanvas --input photo.jpg --script mask.rhai --output masked.jpg
//   gencanvas -i photo.png --script uncrop.rhai --export expanded -o wide.png
//   gencanvas -i shots/*.png --container 800x600 --export render --output-dir out/
//
// Each input is loaded into a fresh viewport of the given container size, the
// optional script drives it, and the chosen export is written to disk.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use egui::Vec2;
use rhai::AST;

use crate::config::CanvasConfig;
use crate::geometry::parse_size;
use crate::ops::export::ExportPayload;
use crate::scripting::{compile_script, run_script};
use crate::source::{EncodedImage, ImageMime};
use crate::viewport::{Command, ViewportState};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Which artifact to write for each input.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind {
    /// Native-resolution image with the mask painted on (inpainting input).
    Composite,
    /// Canvas-sized PNG with transparent new area (outpainting input).
    Expanded,
    /// The viewport as displayed: fitted image plus mask overlay.
    Render,
    /// The source payload, unchanged.
    Source,
}

/// GenCanvas headless viewport driver.
#[derive(Parser, Debug)]
#[command(
    name = "gencanvas",
    about = "GenCanvas headless mask / expansion exporter",
    long_about = "Load images into a viewport, run a Rhai edit script (paint a mask,\n\
                  drag expansion handles, pick an aspect preset) and write the export\n\
                  that would be sent to the generation service.\n\n\
                  Example:\n  \
                  gencanvas --input photo.jpg --script mask.rhai --output masked.jpg\n  \
                  gencanvas -i *.png --script uncrop.rhai --export expanded --output-dir out/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Rhai script run against each loaded viewport.
    #[arg(short, long, value_name = "SCRIPT.rhai")]
    pub script: Option<PathBuf>,

    /// Viewport container size the image is fitted into.
    #[arg(short, long, default_value = "1024x1024", value_name = "WxH")]
    pub container: String,

    /// Artifact to write.
    #[arg(short, long, value_enum, default_value_t = ExportKind::Composite)]
    pub export: ExportKind,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// `key=value` settings file (handle size, brush, mask colour, quality).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print script console output, per-file timing and the session log.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    crate::logger::set_verbosity(args.verbose.then_some(crate::logger::Level::Info));

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let Some(container) = parse_size(&args.container) else {
        eprintln!("error: invalid --container '{}', expected WxH.", args.container);
        return ExitCode::FAILURE;
    };

    let config = match &args.config {
        Some(path) => CanvasConfig::load(path),
        None => CanvasConfig::default(),
    };

    // Compile once; every input runs the same AST.
    let script: Option<AST> = match &args.script {
        Some(path) => {
            let src = match std::fs::read_to_string(path) {
                Ok(src) => src,
                Err(e) => {
                    eprintln!("error: could not read script '{}': {}", path.display(), e);
                    return ExitCode::FAILURE;
                }
            };
            match compile_script(&src) {
                Ok(ast) => Some(ast),
                Err(e) => {
                    eprintln!("error: {}", e.friendly_message());
                    return ExitCode::FAILURE;
                }
            }
        }
        None => None,
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let result = run_one(input_path, script.as_ref(), args.export, container, &config, args.verbose)
            .and_then(|payload| {
                let out = build_output_path(
                    input_path,
                    args.output.as_deref(),
                    args.output_dir.as_deref(),
                    payload.mime(),
                )
                .ok_or_else(|| "cannot determine output path".to_string())?;
                std::fs::write(&out, &payload.image.bytes)
                    .map_err(|e| format!("write '{}' failed: {}", out.display(), e))?;
                Ok((out, payload))
            });

        match result {
            Ok((out, payload)) => {
                if args.verbose || multi {
                    println!(
                        "  → {} {}×{} ({:.0}ms)",
                        out.display(),
                        payload.width,
                        payload.height,
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                crate::log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    script: Option<&AST>,
    export: ExportKind,
    container: Vec2,
    config: &CanvasConfig,
    verbose: bool,
) -> Result<ExportPayload, String> {
    // -- Step 1: Load ----------------------------------------------------
    let bytes = std::fs::read(input).map_err(|e| format!("read failed: {}", e))?;
    let mime = input
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ImageMime::from_extension)
        .or_else(|| ImageMime::sniff(&bytes))
        .ok_or_else(|| "unrecognised image type".to_string())?;
    let mut state = ViewportState::new(config.clone(), container)
        .execute(&Command::LoadImage(EncodedImage::new(mime, bytes)))
        .map_err(|e| format!("load failed: {}", e))?;

    // -- Step 2: Apply script (optional) ---------------------------------
    if let Some(ast) = script {
        let outcome = run_script(ast, state)
            .map_err(|e| format!("script error: {}", e.friendly_message()))?;
        if verbose {
            for line in &outcome.console_output {
                println!("  [script] {}", line);
            }
        }
        state = outcome.state;
    }

    // -- Step 3: Export --------------------------------------------------
    let payload = match export {
        ExportKind::Composite => state.composite_image_with_mask(),
        ExportKind::Expanded => state.final_expanded_image(),
        ExportKind::Source => state.source_payload(),
        ExportKind::Render => {
            let frame = state.render();
            let (width, height) = frame.dimensions();
            EncodedImage::encode(&frame, ImageMime::Png, 100)
                .map(|image| ExportPayload { image, width, height })
        }
    };
    payload.map_err(|e| format!("export failed: {}", e))
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input, with `_out` appended to the stem
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    mime: ImageMime,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = mime.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_out.{}", stem, ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::vec2;
    use image::{Rgba, RgbaImage};

    /// Matches the `--container` default.
    fn default_container() -> Vec2 {
        vec2(1024.0, 1024.0)
    }

    #[test]
    fn output_path_priority() {
        let input = Path::new("shots/cat.jpg");
        assert_eq!(
            build_output_path(input, Some(Path::new("x.png")), Some(Path::new("dir")), ImageMime::Jpeg),
            Some(PathBuf::from("x.png"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("dir")), ImageMime::Jpeg),
            Some(PathBuf::from("dir/cat.jpg"))
        );
        assert_eq!(
            build_output_path(input, None, None, ImageMime::Png),
            Some(PathBuf::from("shots/cat_out.png"))
        );
    }

    #[test]
    fn args_parse() {
        let args = CliArgs::try_parse_from([
            "gencanvas", "-i", "a.png", "--export", "expanded", "--container", "800x600",
        ])
        .unwrap();
        assert_eq!(args.export, ExportKind::Expanded);
        assert_eq!(parse_size(&args.container), Some(vec2(800.0, 600.0)));
        assert_eq!(
            parse_size(&CliArgs::try_parse_from(["gencanvas", "-i", "a"]).unwrap().container),
            Some(default_container())
        );
    }

    #[test]
    fn missing_input_file_fails() {
        let err = run_one(
            Path::new("definitely/not/here.png"),
            None,
            ExportKind::Composite,
            default_container(),
            &CanvasConfig::default(),
            false,
        )
        .unwrap_err();
        assert!(err.starts_with("read failed"));
    }

    #[test]
    fn render_export_is_lossless_png_whatever_the_jpeg_quality() {
        let path = std::env::temp_dir().join(format!("gencanvas-render-{}.jpg", std::process::id()));
        let src = RgbaImage::from_pixel(32, 16, Rgba([40, 80, 120, 255]));
        std::fs::write(&path, EncodedImage::encode(&src, ImageMime::Jpeg, 90).unwrap().bytes).unwrap();

        let low = CanvasConfig { jpeg_quality: 1, ..CanvasConfig::default() };
        let a = run_one(&path, None, ExportKind::Render, vec2(64.0, 64.0), &low, false).unwrap();
        let b = run_one(&path, None, ExportKind::Render, vec2(64.0, 64.0), &CanvasConfig::default(), false)
            .unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(a.mime(), ImageMime::Png);
        assert_eq!((a.width, a.height), (64, 64));
        assert_eq!(a.image, b.image);
    }
}
