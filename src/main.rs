use clap::{Args, Parser, Subcommand};
use image::Rgba;
use log::info;
use pagestitch::composite::CompositeImage;
use pagestitch::encode::EncodedImage;
use pagestitch::surface::{CssPosition, Region, SyntheticElement, SyntheticPage};
use pagestitch::{encode, CaptureConfig, CaptureOverrides, CaptureSurface, ImageFormat, Stitcher, Viewport};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pagestitch", about = "Stitch full-page screenshots from viewport tiles")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture a live page through headless Chrome (requires the `cdp` feature)
    Capture {
        url: String,
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 800)]
        height: u32,
        #[command(flatten)]
        opts: CaptureOpts,
    },
    /// Stitch a generated page with a fixed header, to check the pipeline end to end
    Demo {
        #[arg(long, default_value_t = 2300)]
        page_height: u32,
        #[arg(long, default_value_t = 800)]
        viewport_height: u32,
        #[command(flatten)]
        opts: CaptureOpts,
    },
}

#[derive(Args)]
struct CaptureOpts {
    /// Settle time after each scroll, in milliseconds
    #[arg(long)]
    scroll_delay_ms: Option<u64>,
    #[arg(long)]
    overlap: Option<u32>,
    #[arg(long)]
    max_height: Option<u32>,
    #[arg(long)]
    quality: Option<f32>,
    /// png or jpeg
    #[arg(long, value_parser = parse_format)]
    format: Option<ImageFormat>,
    /// Use the feedback widget's slower preset as the base configuration
    #[arg(long)]
    widget: bool,
    /// Downscale wider captures to this width (4000 with --widget)
    #[arg(long)]
    max_width: Option<u32>,
    /// Defaults to capture.png or capture.jpg
    #[arg(short, long)]
    out: Option<PathBuf>,
}

impl CaptureOpts {
    fn config(&self) -> CaptureConfig {
        let base = if self.widget { CaptureConfig::widget() } else { CaptureConfig::default() };
        base.merged(&CaptureOverrides {
            scroll_delay: self.scroll_delay_ms,
            overlap: self.overlap,
            max_height: self.max_height,
            quality: self.quality,
            format: self.format,
        })
    }

    fn max_width(&self) -> Option<u32> {
        self.max_width.or(if self.widget { Some(WIDGET_MAX_WIDTH) } else { None })
    }

    fn out_path(&self, format: ImageFormat) -> PathBuf {
        self.out.clone().unwrap_or_else(|| PathBuf::from(format!("capture.{}", format.extension())))
    }
}

/// Widest image the feedback widget uploads
const WIDGET_MAX_WIDTH: u32 = 4000;

/// Re-encode `image` narrower when it exceeds `max_width`.
fn downscaled(image: &CompositeImage, config: &CaptureConfig, max_width: u32) -> anyhow::Result<EncodedImage> {
    if image.bitmap.width() <= max_width {
        return Ok(image.encoded.clone());
    }
    let bitmap = encode::resize(&image.bitmap, max_width, u32::MAX)?;
    info!("Downscaled {}x{} to {}x{}", image.bitmap.width(), image.bitmap.height(), bitmap.width(), bitmap.height());
    Ok(encode::encode(&bitmap, config.format, config.quality)?)
}

fn parse_format(s: &str) -> Result<ImageFormat, String> {
    match s.to_ascii_lowercase().as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
        other => Err(format!("unknown format '{}'", other)),
    }
}

fn stitch<S: CaptureSurface>(surface: S, opts: &CaptureOpts) -> anyhow::Result<()> {
    let config = opts.config();
    let mut stitcher = Stitcher::new(surface);
    let image = stitcher.capture_full_page(&config)?;
    let encoded = match opts.max_width() {
        Some(max_width) => downscaled(&image, &config, max_width)?,
        None => image.encoded.clone(),
    };
    let out = opts.out_path(config.format);
    std::fs::write(&out, &encoded.bytes)?;
    println!(
        "{}x{} from {} tile(s), {} -> {}",
        image.geometry.page_width,
        image.geometry.page_height,
        image.tiles,
        encode::format_size(encoded.bytes.len()),
        out.display()
    );
    Ok(())
}

#[cfg(feature = "cdp")]
fn capture(url: &str, viewport: Viewport, opts: &CaptureOpts) -> anyhow::Result<()> {
    let surface = pagestitch::cdp::CdpSurface::launch(viewport)?;
    surface.navigate(url)?;
    stitch(surface, opts)
}

#[cfg(not(feature = "cdp"))]
fn capture(_url: &str, _viewport: Viewport, _opts: &CaptureOpts) -> anyhow::Result<()> {
    anyhow::bail!("pagestitch was built without the `cdp` feature; rebuild with --features cdp")
}

fn demo_page(viewport: Viewport, page_height: u32) -> SyntheticPage {
    SyntheticPage::striped(viewport, viewport.width, page_height)
        .with_element(SyntheticElement::new(
            "site-header",
            CssPosition::Fixed,
            Region::new(0, 0, viewport.width, 60),
            Rgba([200, 30, 30, 255]),
        ))
        .with_element(SyntheticElement::new(
            "wpvfh-container",
            CssPosition::Fixed,
            Region::new(viewport.width.saturating_sub(80), viewport.height.saturating_sub(80), 60, 60),
            Rgba([30, 30, 200, 255]),
        ))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match &cli.command {
        Command::Capture { url, width, height, opts } => {
            capture(url, Viewport { width: *width, height: *height }, opts)
        }
        Command::Demo { page_height, viewport_height, opts } => {
            let viewport = Viewport { width: 1024, height: *viewport_height };
            stitch(demo_page(viewport, *page_height), opts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(args: &[&str]) -> CaptureOpts {
        let mut argv = vec!["pagestitch", "demo"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Command::Demo { opts, .. } => opts,
            Command::Capture { .. } => unreachable!(),
        }
    }

    #[test]
    fn output_name_follows_the_format() {
        assert_eq!(opts(&[]).out_path(ImageFormat::Png), PathBuf::from("capture.png"));
        assert_eq!(opts(&["--format", "jpeg"]).out_path(ImageFormat::Jpeg), PathBuf::from("capture.jpg"));
        assert_eq!(opts(&["-o", "shot.png"]).out_path(ImageFormat::Jpeg), PathBuf::from("shot.png"));
    }

    #[test]
    fn widget_preset_caps_the_width() {
        assert_eq!(opts(&[]).max_width(), None);
        assert_eq!(opts(&["--widget"]).max_width(), Some(WIDGET_MAX_WIDTH));
        assert_eq!(opts(&["--widget", "--max-width", "640"]).max_width(), Some(640));
    }

    #[test]
    fn wide_composites_are_downscaled_before_writing() {
        let viewport = Viewport { width: 1024, height: 400 };
        let opts = opts(&["--scroll-delay-ms", "0", "--format", "png"]);
        let config = opts.config();
        let image = Stitcher::new(demo_page(viewport, 900)).capture_full_page(&config).unwrap();

        let narrowed = encode::decode(&downscaled(&image, &config, 512).unwrap().bytes).unwrap();
        assert_eq!(narrowed.dimensions(), (512, 450));

        let untouched = downscaled(&image, &config, 4000).unwrap();
        assert_eq!(untouched.bytes, image.encoded.bytes);
    }
}
