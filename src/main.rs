use clap::{Parser, Subcommand};
use sitebuilder::publish::{BuildOptions, Publisher};
use sitebuilder::{config, output, publish};
use std::path::PathBuf;

fn version_string() -> &'static str {
    if env!("SITEBUILDER_RELEASE") == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("SITEBUILDER_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "sitebuilder")]
#[command(about = "Static site builder for localized, content-addressed HTML sites")]
#[command(long_about = "\
Static site builder for localized, content-addressed HTML sites

The sitemap decides what gets published. HTML sources are rendered once per
language, everything else they reference is published under _resources/ by
content hash, and a sync script is written for uploading the result to S3.

Site structure:

  site/
  ├── site.yaml                    # Languages, sitemap name, icon set, exclusions
  ├── sitemap.yaml                 # paths: { /: index.html, /old.html: \"-> /\" }
  ├── index.html                   # Template; text starting with '.' is a string key
  ├── style.css                    # url() references rewritten to hashed names
  ├── logo.png                     # Global resource, referenced by file name
  ├── AppIcon.imageset/            # Icon set (Contents.json lists the images)
  ├── en.lproj/
  │   ├── Localizable.strings.yaml # en: { title: Welcome }
  │   └── logo.png                 # English override of logo.png
  └── fr.lproj/
      └── index.strings.yaml       # Strings for index.html only

Output:

  builds/<label>/www/              # The site, default language at the root
  builds/<label>/s3/sync.sh        # ./sync.sh s3://bucket[/prefix]
  builds/latest                    # Symlink to the newest release build

Run 'sitebuilder gen-config' to generate a documented site.yaml.")]
#[command(version = version_string())]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site into a fresh build directory
    Make {
        /// Site root (the directory containing site.yaml)
        site: PathBuf,
        /// Directory holding all builds and the `latest` link
        #[arg(long, default_value = "builds")]
        builds_root: PathBuf,
        /// Build label; defaults to a random one (or `debug`)
        #[arg(long)]
        build_label: Option<String>,
        /// Debug build: fixed `debug` label, `latest` left alone
        #[arg(long)]
        debug: bool,
    },
    /// Validate the site without building
    Check {
        /// Site root (the directory containing site.yaml)
        site: PathBuf,
    },
    /// Print a stock site.yaml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Make {
            site,
            builds_root,
            build_label,
            debug,
        } => {
            let mut options = BuildOptions::new(site, builds_root);
            options.label = build_label;
            options.debug = debug;

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_build_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = Publisher::new(options).with_events(tx).build();
            // The publisher owned the only sender, so the printer drains and exits.
            if printer.join().is_err() {
                log::warn!("progress printer panicked");
            }
            output::print_summary(&result?);
        }
        Command::Check { site } => {
            println!("==> Checking {}", site.display());
            let report = publish::check(&site)?;
            output::print_check_report(&report);
            if !report.missing.is_empty() {
                return Err(format!("{} sitemap source(s) missing", report.missing.len()).into());
            }
            println!("==> Site is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_yaml());
        }
    }

    Ok(())
}
