use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use histeq_core::device::{platforms, select_device};
use histeq_core::io::{self, OutputFormat};
use histeq_core::{run, Algorithm, ComputeDevice, EqualisationConfig, Outcome};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "histeq")]
#[command(version, about = "Histogram equalisation on a data-parallel device", long_about = None)]
struct Cli {
    /// Platform index (see --list)
    #[arg(short, long, default_value_t = 0)]
    platform: usize,

    /// Device index within the platform (see --list)
    #[arg(short, long, default_value_t = 0)]
    device: usize,

    /// List platforms and devices, then exit
    #[arg(short, long)]
    list: bool,

    /// Input image (PNG, PGM/PPM or JPEG)
    #[arg(short, long, value_name = "FILE", required_unless_present = "list")]
    file: Option<PathBuf>,

    /// Algorithm: serial, parallel, hsl or compare
    #[arg(short, long, default_value = "parallel")]
    algorithm: Algorithm,

    /// Histogram bin width in sample values
    #[arg(short, long, default_value_t = 1)]
    bin_size: u32,

    /// Output image; defaults to <input>_<algorithm>.<ext>
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Scan work-group width; defaults to the device's preferred multiple
    #[arg(long, value_name = "N")]
    group_size: Option<usize>,

    /// JPEG quality when writing .jpg output (1-100)
    #[arg(long, default_value_t = io::DEFAULT_JPEG_QUALITY)]
    quality: u8,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "histeq=info,histeq_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let cli = Cli::parse();

    if cli.list {
        print_devices();
        return Ok(());
    }

    let Some(input) = cli.file.as_deref() else {
        bail!("no input file given");
    };
    let device = select_device(cli.platform, cli.device)
        .with_context(|| format!("selecting device {}:{}", cli.platform, cli.device))?;
    info!(device = %device.info(), "using device");

    let image = io::load(input).with_context(|| format!("loading {}", input.display()))?;
    let config = EqualisationConfig {
        bin_size: cli.bin_size,
        group_width: cli.group_size,
    };

    let output_image = match run(&device, &image, &config, cli.algorithm)? {
        Outcome::Equalised(out) => {
            println!("{}", out.report);
            out.image
        }
        Outcome::Compared(comparisons) => {
            for comparison in &comparisons {
                println!("{comparison}\n");
                if !comparison.is_identical() {
                    warn!(
                        mismatched = comparison.mismatched_samples,
                        max_difference = comparison.max_difference,
                        "serial and parallel outputs differ"
                    );
                }
            }
            match comparisons.into_iter().next() {
                Some(first) => first.parallel.image,
                None => bail!("comparison produced no output"),
            }
        }
    };

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(input, cli.algorithm));
    let format = match OutputFormat::from_path(&output)? {
        OutputFormat::Jpeg { .. } => OutputFormat::Jpeg {
            quality: cli.quality,
        },
        format => format,
    };
    io::save_as(&output, &output_image, format)
        .with_context(|| format!("saving {}", output.display()))?;
    println!("wrote {}", output.display());

    Ok(())
}

fn print_devices() {
    for (p, platform) in platforms().iter().enumerate() {
        println!("Platform {p}: {platform}");
        for (d, device) in platform.devices.iter().enumerate() {
            println!(
                "  Device {d}: {} ({} compute units, max work-group {}, preferred multiple {})",
                device.name,
                device.compute_units,
                device.max_work_group_size,
                device.preferred_work_group_multiple
            );
        }
    }
}

/// `<dir>/<stem>_<algorithm>.<ext>`, keeping the input extension when it can
/// be written and falling back to PNG.
fn default_output(input: &Path, algorithm: Algorithm) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .filter(|_| OutputFormat::from_path(input).is_ok())
        .unwrap_or("png");
    input.with_file_name(format!("{stem}_{algorithm}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "histeq", "-p", "0", "-d", "1", "-f", "in.png", "-a", "hsl", "-b", "4", "-o",
            "out.ppm", "--group-size", "32",
        ])
        .unwrap();
        assert_eq!(cli.device, 1);
        assert_eq!(cli.file, Some(PathBuf::from("in.png")));
        assert_eq!(cli.algorithm, Algorithm::Hsl);
        assert_eq!(cli.bin_size, 4);
        assert_eq!(cli.output, Some(PathBuf::from("out.ppm")));
        assert_eq!(cli.group_size, Some(32));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["histeq", "--file", "a.png"]).unwrap();
        assert_eq!(cli.platform, 0);
        assert_eq!(cli.device, 0);
        assert_eq!(cli.algorithm, Algorithm::Parallel);
        assert_eq!(cli.bin_size, 1);
        assert_eq!(cli.group_size, None);
        assert!(!cli.list);
    }

    #[test]
    fn test_file_required_without_list() {
        assert!(Cli::try_parse_from(["histeq"]).is_err());
        assert!(Cli::try_parse_from(["histeq", "--list"]).is_ok());
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        assert!(Cli::try_parse_from(["histeq", "-f", "a.png", "-a", "fastest"]).is_err());
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output(Path::new("dir/photo.jpg"), Algorithm::Hsl),
            PathBuf::from("dir/photo_hsl.jpg")
        );
        assert_eq!(
            default_output(Path::new("scan.tif"), Algorithm::Serial),
            PathBuf::from("scan_serial.png")
        );
    }
}
