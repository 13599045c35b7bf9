use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facecap_core::rig::{filter_bones, find_best_match, BoneRole};
use facecap_gltf::AvatarScene;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod session;

use config::Config;
use session::{CaptureOptions, Input};

#[derive(Parser)]
#[command(name = "facecap", version, about = "Facial motion capture for glTF avatars")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/facecap/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More log output (-v debug, -vv trace); overrides RUST_LOG
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the avatar's bones and the auto-detected head/neck
    Bones {
        avatar: PathBuf,
        /// Only show bones containing this text
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Show the avatar's morph-capable meshes and their morph targets
    Inspect { avatar: PathBuf },
    /// Record a take onto the avatar from a tracker stream
    Capture {
        avatar: PathBuf,
        /// Detection file extracted from a video, or `-` for stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Head bone name (default: auto-detect)
        #[arg(long)]
        head_bone: Option<String>,
        /// Stop recording after this many seconds
        #[arg(short, long)]
        duration: Option<f32>,
        /// Play the take back after recording
        #[arg(long)]
        play: bool,
        /// Export the take as a .glb into the output directory
        #[arg(long)]
        export: bool,
        /// Print the capture report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("facecap=info")),
        1 => EnvFilter::new("facecap=debug"),
        _ => EnvFilter::new("facecap=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Bones { avatar, filter } => {
            let scene = load_avatar(&avatar)?;
            let bones = scene.bones();
            let head = find_best_match(&bones, BoneRole::Head);
            let neck = find_best_match(&bones, BoneRole::Neck);
            let shown = match &filter {
                Some(term) => filter_bones(&bones, term),
                None => bones.clone(),
            };
            for bone in &shown {
                let tag = if Some(*bone) == head {
                    "  [head]"
                } else if Some(*bone) == neck {
                    "  [neck]"
                } else {
                    ""
                };
                println!("{bone}{tag}");
            }
            println!("{} of {} bones", shown.len(), bones.len());
        }
        Commands::Inspect { avatar } => {
            let scene = load_avatar(&avatar)?;
            let meshes = scene.morph_meshes();
            if meshes.is_empty() {
                println!("No morph-capable meshes; expressions cannot be driven or exported");
            }
            let map = config.channel_map();
            for mesh in meshes {
                println!(
                    "{} (node {}, mesh {}, {} morphs)",
                    mesh.name,
                    mesh.node,
                    mesh.mesh,
                    mesh.targets.len()
                );
                for morph in &mesh.targets {
                    println!("  {morph}");
                }
            }
            let driven = facecap_core::ChannelSet::mediapipe()
                .names()
                .iter()
                .filter(|c| meshes.iter().any(|m| m.target_index(map.morph_for(c)).is_some()))
                .count();
            println!("{driven} tracker channels reach this avatar");
        }
        Commands::Capture {
            avatar,
            input,
            head_bone,
            duration,
            play,
            export,
            json,
        } => {
            let scene = load_avatar(&avatar)?;
            let requested = head_bone.as_deref().or(config.head_bone.as_deref());
            let head = session::resolve_head(&scene, requested)?;
            let input = match input {
                Some(path) if path != Path::new("-") => Input::File(path),
                _ => Input::Stdin,
            };
            let options = CaptureOptions {
                input,
                duration,
                play,
                export,
            };

            let report = session::capture(&config, &scene, head, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                match &report.take {
                    Some(take) => println!(
                        "{}: {} samples, {:.2}s",
                        take.name, take.samples, take.duration_seconds
                    ),
                    None => println!("Nothing recorded"),
                }
                if report.dropped_frames > 0 || report.malformed_lines > 0 {
                    println!(
                        "dropped {} frames, skipped {} malformed lines",
                        report.dropped_frames, report.malformed_lines
                    );
                }
                if let Some(path) = &report.export_path {
                    println!("Exported {}", path.display());
                }
            }
        }
        Commands::Status => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(config::default_config_path);
            let source = if path.is_file() { "" } else { " (not found, using defaults)" };
            println!("config:        {}{source}", path.display());
            println!("output dir:    {}", config.output_dir.display());
            println!("playback fps:  {}", config.playback_fps);
            println!(
                "head bone:     {}",
                config.head_bone.as_deref().unwrap_or("auto-detect")
            );
            println!("loop video:    {}", config.loop_video);
            println!(
                "axis:          x{:+} y{:+} z{:+}",
                config.axis.x, config.axis.y, config.axis.z
            );
            println!("channel map:   {} entries", config.channel_map().len());
            let exports = std::fs::read_dir(&config.output_dir)
                .map(|dir| {
                    dir.filter_map(|e| e.ok())
                        .filter(|e| {
                            let name = e.file_name();
                            let name = name.to_string_lossy();
                            name.contains("_FaceCap") && name.ends_with(".glb")
                        })
                        .count()
                })
                .unwrap_or(0);
            println!("exports:       {exports}");
        }
    }

    Ok(())
}

fn load_avatar(path: &Path) -> Result<AvatarScene> {
    AvatarScene::load(path).with_context(|| format!("failed to load avatar {}", path.display()))
}
