use clap::{Parser, Subcommand};
use event_gallery::config::{self, GalleryConfig};
use event_gallery::export::{ArchiveExporter, CancelToken, ExportSettings, LocalSave, export_one};
use event_gallery::fetch::HttpFetcher;
use event_gallery::lightbox::{
    ClickTarget, Lightbox, LightboxAction, LightboxKey, LightboxSession, Prefetcher, WARM_CAPACITY,
};
use event_gallery::output;
use event_gallery::store::{self, Gallery, RestStore};
use event_gallery::urls::UrlResolver;
use event_gallery::window::{SentinelSignal, Viewport, WindowController};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "event-gallery")]
#[command(about = "Browse and download remotely-hosted event photo galleries")]
#[command(long_about = "\
Browse and download remotely-hosted event photo galleries

Collections and image records are read from a PostgREST-style record store.
Images are served either from legacy object storage (rendered on demand at
480/960/1280 px) or from a CDN with pre-computed URLs; both are supported.

Typical session:

  event-gallery list                        # active collections, newest first
  event-gallery show maite --pages 2        # header and first grid pages
  event-gallery view maite 3                # lightbox at photo 3 (h/l/d/q)
  event-gallery download-one maite 3        # original of photo 3
  event-gallery download maite -o ~/photos  # maite-gallery.zip

Store credentials come from config.toml or EVENT_GALLERY_STORE_URL and
EVENT_GALLERY_ANON_KEY. Set RUST_LOG=event_gallery=debug for detailed logs.

Run 'event-gallery gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Shared flags for commands that write files.
#[derive(clap::Args, Clone)]
struct OutputArgs {
    /// Directory for saved files (default: [export] output_dir)
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// List active collections
    List,
    /// Show a collection header and its first grid pages
    Show {
        slug: String,
        /// Number of scroll-to-bottom triggers to simulate
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },
    /// Print every delivery URL of a collection
    Urls { slug: String },
    /// Download a whole collection as one zip archive
    Download {
        slug: String,
        #[command(flatten)]
        output: OutputArgs,
        /// Maximum simultaneous downloads
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Download a single image by URL, or by collection slug and position
    DownloadOne {
        /// Image URL, or a collection slug when POSITION is given
        target: String,
        /// 1-based photo position within the collection
        position: Option<usize>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Step through a collection in the lightbox (reads h/l/d/q from stdin)
    View {
        slug: String,
        /// 1-based photo position to open at
        position: usize,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("event_gallery=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let mut config = config::load_config(&cli.config)?;
    debug!(path = %cli.config.display(), "Loaded config");
    let client = reqwest::Client::builder()
        .user_agent(concat!("event-gallery/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let resolver = UrlResolver::new(&config.origin, &config.images);

    match cli.command {
        Command::List => {
            let store = RestStore::new(client, &config.store)?;
            let cards = store::load_collections(Arc::new(store)).await;
            output::print_collections(&cards, &resolver);
        }
        Command::Show { slug, pages } => {
            let store = RestStore::new(client, &config.store)?;
            let gallery = store::load_gallery(&store, &slug).await;
            let window = WindowController::new(&config.window);
            if let Some(meta) = gallery.meta() {
                window.load(&meta.id, gallery.images().len());
            }
            simulate_scroll(&window, pages);
            output::print_gallery(&gallery, &resolver, &window.snapshot());
        }
        Command::Urls { slug } => {
            let store = RestStore::new(client, &config.store)?;
            match store::load_gallery(&store, &slug).await {
                Gallery::Ready { images, .. } => output::print_url_sets(&images, &resolver),
                other => output::print_gallery(&other, &resolver, &WindowController::new(&config.window).snapshot()),
            }
        }
        Command::Download {
            slug,
            output: output_args,
            concurrency,
        } => {
            apply_output(&mut config, &output_args);
            if let Some(n) = concurrency {
                config.export.concurrency = n;
                config.validate()?;
            }
            let store = RestStore::new(client.clone(), &config.store)?;
            let gallery = store::load_gallery(&store, &slug).await;
            let Gallery::Ready { images, .. } = &gallery else {
                output::print_gallery(&gallery, &resolver, &WindowController::new(&config.window).snapshot());
                return Ok(());
            };
            download_archive(&config, client, resolver, images, &slug).await?;
        }
        Command::DownloadOne {
            target,
            position,
            output: output_args,
        } => {
            apply_output(&mut config, &output_args);
            let url = match position {
                None => target,
                Some(position) => {
                    let store = RestStore::new(client.clone(), &config.store)?;
                    let gallery = store::load_gallery(&store, &target).await;
                    let Some(record) = position.checked_sub(1).and_then(|i| gallery.images().get(i)) else {
                        println!("No photo at position {} ({} photos)", position, gallery.images().len());
                        return Ok(());
                    };
                    resolver.resolve(record)?.original
                }
            };
            let saver = LocalSave::new(&config.export.output_dir);
            match export_one(&HttpFetcher::new(client), &saver, &url).await {
                Some(path) => println!("Saved {}", path.display()),
                None => println!("Download failed"),
            }
        }
        Command::View {
            slug,
            position,
            output: output_args,
        } => {
            apply_output(&mut config, &output_args);
            let store = RestStore::new(client.clone(), &config.store)?;
            let gallery = store::load_gallery(&store, &slug).await;
            resolver.ensure_configured(gallery.images())?;
            let Some(lightbox) = position
                .checked_sub(1)
                .and_then(|index| Lightbox::open(&resolver, gallery.images(), index))
            else {
                println!("No photo at position {} ({} photos)", position, gallery.images().len());
                return Ok(());
            };
            let prefetcher = Prefetcher::new(Arc::new(HttpFetcher::new(client)), WARM_CAPACITY);
            let saver = LocalSave::new(&config.export.output_dir);
            run_lightbox(LightboxSession::new(lightbox, prefetcher), &saver).await?;
        }
        Command::GenConfig => print!("{}", config::stock_config_toml()),
    }

    Ok(())
}

fn apply_output(config: &mut GalleryConfig, args: &OutputArgs) {
    if let Some(dir) = &args.output {
        config.export.output_dir = dir.to_string_lossy().into_owned();
    }
}

/// Feed `pages` near-viewport reports into a fresh sentinel binding.
fn simulate_scroll(window: &WindowController, pages: usize) {
    let binding = window.bind_sentinel();
    let viewport = Viewport {
        scroll_top: 0.0,
        height: 800.0,
    };
    for _ in 0..pages {
        match binding.observe(&viewport, viewport.height) {
            SentinelSignal::Grew(visible) => debug!(visible, "Loaded more"),
            _ => break,
        }
    }
}

async fn download_archive(
    config: &GalleryConfig,
    client: reqwest::Client,
    resolver: UrlResolver,
    images: &[event_gallery::types::ImageRecord],
    slug: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let exporter = ArchiveExporter::new(
        Arc::new(HttpFetcher::new(client)),
        resolver,
        LocalSave::new(&config.export.output_dir),
        ExportSettings::from_config(&config.export),
    );

    let cancel = CancelToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling download");
                cancel.cancel();
            }
        })
    };

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_export_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = exporter.export_all(images, slug, &cancel, Some(&tx)).await;
    drop(tx);
    interrupt.abort();
    printer.join().map_err(|_| "progress printer panicked")?;

    if let Some(line) = output::format_export_outcome(&result?) {
        println!("{}", line);
    }
    Ok(())
}

async fn run_lightbox<F>(mut session: LightboxSession<F>, saver: &LocalSave) -> Result<(), Box<dyn std::error::Error>>
where
    F: event_gallery::fetch::Fetcher + 'static,
{
    output::print_lightbox(session.lightbox());
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let action = match line.trim() {
            "l" | "right" => session.handle_key(LightboxKey::Right),
            "h" | "left" => session.handle_key(LightboxKey::Left),
            "q" | "esc" => session.handle_key(LightboxKey::Escape),
            "d" | "download" => session.handle_key(LightboxKey::Download),
            "i" | "image" => session.handle_click(ClickTarget::Image),
            "b" | "backdrop" => session.handle_click(ClickTarget::Backdrop),
            _ => session.handle_key(LightboxKey::Other),
        };
        match action {
            LightboxAction::Show(_) => {
                output::print_lightbox(session.lightbox());
                if let Some(url) = session.lightbox().current_url() {
                    if session.prefetcher().is_warm(url) {
                        println!("    (prefetched)");
                    }
                }
            }
            LightboxAction::Download(index) => match session.download(index, saver).await {
                Some(path) => println!("    Saved {}", path.display()),
                None => println!("    Download failed"),
            },
            LightboxAction::Close => break,
            LightboxAction::Ignore => {}
        }
    }
    Ok(())
}
