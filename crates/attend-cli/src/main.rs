use anyhow::{bail, Context, Result};
use attend_geo::ConfiguredLocator;
use attend_hw::Camera;
use attend_store::{MarkOutcome, Role, Store, User};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod tracker;

use config::Config;
use engine::{spawn_engine, EngineOptions};
use tracker::{FaceSource, MatchSettings, Signup, StudentForm, Tracker};

#[derive(Parser)]
#[command(name = "attend", version, about = "Hostel attendance with face and location checks")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/attend/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Account to act as; prompted for when omitted
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a login account
    Signup {
        /// "student" or "warden"
        #[arg(long, default_value = "student")]
        role: Role,
        /// Enrollment number (students only)
        #[arg(short, long)]
        enrollment: Option<String>,
    },
    /// Register a student's face and hostel location (warden)
    RegisterStudent {
        enrollment: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        room: String,
        /// Take the face from a photo instead of the camera
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Mark today's attendance (student)
    Mark,
    /// Show attendance dates
    Attendance {
        /// Enrollment number (required for wardens)
        enrollment: Option<String>,
    },
    /// List registered students (warden)
    Students,
    /// Delete a student and their login (warden)
    DeleteStudent {
        enrollment: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Print the current location as seen by the geolocation service
    Locate,
    /// Show configuration, models, cameras and database counts
    Status,
    /// Run camera diagnostics
    Test {
        /// Save the captured frame as PNG
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;
    tracing::debug!(source = ?cfg.source, db = %cfg.db_path.display(), "configuration loaded");

    match cli.command {
        Commands::Signup { role, enrollment } => {
            let tracker = open_tracker(&cfg)?;
            let username = username(cli.user)?;
            let password = password("Password: ")?;
            let confirm = match std::env::var("ATTEND_PASSWORD") {
                Ok(_) => password.clone(),
                Err(_) => prompt("Confirm password: ")?,
            };
            tracker.signup(&Signup {
                username: &username,
                password: &password,
                confirm: &confirm,
                role,
                enrollment_number: enrollment.as_deref(),
            })?;
            println!("Account {username} created ({role})");
        }
        Commands::RegisterStudent {
            enrollment,
            name,
            room,
            photo,
        } => {
            let tracker = open_tracker(&cfg)?;
            let warden = login(&tracker, cli.user, Some(Role::Warden))?;
            let face = match &photo {
                Some(path) => FaceSource::Photo(
                    attend_hw::load_photo(path).with_context(|| format!("cannot load {}", path.display()))?,
                ),
                None => FaceSource::Camera,
            };
            let probe = spawn_engine(EngineOptions {
                camera_device: photo.is_none().then_some(cfg.camera_device.as_str()),
                detector_path: &cfg.detector_model_path(),
                recognizer_path: &cfg.recognizer_model_path(),
                warmup_frames: cfg.warmup_frames,
            })?;
            if photo.is_none() {
                println!("Look at the camera...");
            }

            let form = StudentForm {
                enrollment_number: &enrollment,
                name: &name,
                room: &room,
            };
            let registered = tracker.register_student(&probe, &warden, &form, face).await?;
            println!(
                "Registered {} at {} [face quality {:.2}]",
                registered.enrollment_number, registered.hostel_location, registered.quality
            );
        }
        Commands::Mark => {
            let tracker = open_tracker(&cfg)?;
            let student = login(&tracker, cli.user, Some(Role::Student))?;
            let probe = spawn_engine(EngineOptions {
                camera_device: Some(&cfg.camera_device),
                detector_path: &cfg.detector_model_path(),
                recognizer_path: &cfg.recognizer_model_path(),
                warmup_frames: cfg.warmup_frames,
            })?;
            println!("Look at the camera...");

            let marked = tracker.mark_attendance(&probe, &student).await?;
            match marked.outcome {
                MarkOutcome::Marked => println!(
                    "Attendance marked for {} on {} (similarity {:.2})",
                    marked.enrollment_number, marked.date, marked.similarity
                ),
                MarkOutcome::AlreadyMarked => println!(
                    "Attendance for {} was already marked on {}",
                    marked.enrollment_number, marked.date
                ),
            }
        }
        Commands::Attendance { enrollment } => {
            let tracker = open_tracker(&cfg)?;
            let user = login(&tracker, cli.user, None)?;
            let (enrollment, dates) = tracker.attendance(&user, enrollment.as_deref())?;
            if dates.is_empty() {
                println!("No attendance records for {enrollment}");
            } else {
                println!("Attendance for {enrollment} ({} days):", dates.len());
                for d in dates {
                    println!("  {d}");
                }
            }
        }
        Commands::Students => {
            let tracker = open_tracker(&cfg)?;
            let warden = login(&tracker, cli.user, Some(Role::Warden))?;
            let students = tracker.students(&warden)?;
            if students.is_empty() {
                println!("No students registered");
            }
            for s in students {
                println!(
                    "{:<16} {:<28} {}",
                    s.enrollment_number,
                    s.name,
                    s.room.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::DeleteStudent { enrollment, yes } => {
            let tracker = open_tracker(&cfg)?;
            let warden = login(&tracker, cli.user, Some(Role::Warden))?;
            if !yes {
                let answer = prompt(&format!("Delete student {enrollment} and their login? [y/N] "))?;
                if !matches!(answer.trim(), "y" | "Y" | "yes") {
                    println!("Aborted");
                    return Ok(());
                }
            }
            tracker.delete_student(&warden, &enrollment)?;
            println!("Deleted student {enrollment}");
        }
        Commands::Locate => {
            let tracker = open_tracker(&cfg)?;
            println!("{}", tracker.locate().await?);
        }
        Commands::Status => status(&cfg)?,
        Commands::Test { save } => camera_test(&cfg, save.as_deref())?,
    }

    Ok(())
}

fn open_tracker(cfg: &Config) -> Result<Tracker<ConfiguredLocator>> {
    let store = Store::open(&cfg.db_path)
        .with_context(|| format!("cannot open database {}", cfg.db_path.display()))?;
    let settings = MatchSettings {
        threshold: cfg.similarity_threshold,
        frames_per_verify: cfg.frames_per_verify,
        frames_per_enroll: cfg.frames_per_enroll,
    };
    Ok(Tracker::new(store, cfg.locator()?, settings))
}

fn login(tracker: &Tracker<ConfiguredLocator>, user: Option<String>, role: Option<Role>) -> Result<User> {
    let username = username(user)?;
    let password = password("Password: ")?;
    Ok(tracker.login(&username, &password, role)?)
}

fn username(user: Option<String>) -> Result<String> {
    match user {
        Some(u) => Ok(u),
        None => prompt("Username: "),
    }
}

/// `$ATTEND_PASSWORD`, or a line read from stdin.
fn password(label: &str) -> Result<String> {
    match std::env::var("ATTEND_PASSWORD") {
        Ok(p) => Ok(p),
        Err(_) => prompt(label),
    }
}

fn prompt(label: &str) -> Result<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{label}")?;
    stderr.flush()?;

    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line)? == 0 {
        bail!("no input for {:?}", label.trim_end_matches([':', ' ']));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn status(cfg: &Config) -> Result<()> {
    let model = |path: String| serde_json::json!({ "path": path, "present": Path::new(&path).exists() });

    let database = match Store::open(&cfg.db_path) {
        Ok(store) => {
            let c = store.counts()?;
            serde_json::json!({
                "path": cfg.db_path,
                "users": c.users,
                "students": c.students,
                "attendance": c.attendance,
            })
        }
        Err(e) => serde_json::json!({ "path": cfg.db_path, "error": e.to_string() }),
    };

    let cameras: Vec<_> = Camera::list_devices()
        .into_iter()
        .map(|d| serde_json::json!({ "path": d.path, "name": d.name, "driver": d.driver, "bus": d.bus }))
        .collect();

    let report = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "config": cfg.source,
        "camera_device": cfg.camera_device,
        "similarity_threshold": cfg.similarity_threshold,
        "location": cfg.location_override.as_deref().unwrap_or(&cfg.geo_endpoint),
        "models": {
            "detector": model(cfg.detector_model_path()),
            "recognizer": model(cfg.recognizer_model_path()),
        },
        "cameras": cameras,
        "database": database,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Direct camera check, no models involved.
fn camera_test(cfg: &Config, save: Option<&Path>) -> Result<()> {
    println!("Opening {}...", cfg.camera_device);
    let camera = Camera::open(&cfg.camera_device)?;
    println!("  {}x{} {:?}", camera.width, camera.height, camera.fourcc);

    for _ in 0..cfg.warmup_frames {
        let _ = camera.capture_frame();
    }
    let frame = camera.capture_frame()?;
    println!(
        "  frame #{}: brightness {:.1}/255{}",
        frame.sequence,
        frame.avg_brightness(),
        if frame.is_dark { " (dark)" } else { "" }
    );

    if let Some(path) = save {
        let img = frame.to_image().context("frame buffer does not match its dimensions")?;
        img.save(path).with_context(|| format!("cannot write {}", path.display()))?;
        println!("  saved {}", path.display());
    }
    Ok(())
}
