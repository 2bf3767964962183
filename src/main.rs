use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use tsumugi::{BuildConfig, IconListing, Project, Run, ServerConfig, TaskId};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Clean and build everything, then watch in development mode.
    Default,
    Clean,
    Scripts,
    Styles,
    Images,
    Fonts,
    Icons,
    Sprite,
    Modernizr,
    /// Build, then watch and serve regardless of `--dev`.
    Watch,
    /// Print the default task graph as a Mermaid diagram.
    Graph,
}

impl Command {
    fn task(self) -> Option<TaskId> {
        match self {
            Command::Clean => Some(TaskId::Clean),
            Command::Scripts => Some(TaskId::Scripts),
            Command::Styles => Some(TaskId::Styles),
            Command::Images => Some(TaskId::Images),
            Command::Fonts => Some(TaskId::Fonts),
            Command::Icons => Some(TaskId::Icons),
            Command::Sprite => Some(TaskId::Sprite),
            Command::Modernizr => Some(TaskId::Modernizr),
            Command::Default | Command::Watch | Command::Graph => None,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    #[clap(value_enum, index = 1, default_value = "default")]
    task: Command,

    /// Development mode: no minification, source maps, watch and serve.
    #[arg(long)]
    dev: bool,

    /// Emit source maps outside of development mode too.
    #[arg(long)]
    sourcemaps: bool,

    /// Project root, every other path is relative to it.
    #[arg(long, default_value = ".")]
    root: Utf8PathBuf,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Preferred port of the reload socket.
    #[arg(long, default_value_t = 1337)]
    reload_port: u16,

    /// Browserslist query used for vendor prefixes, may be repeated.
    #[arg(long = "browsers", value_name = "QUERY")]
    browsers: Vec<String>,

    /// Bundler binary used for scripts.
    #[arg(long, default_value = "esbuild", value_name = "BIN")]
    esbuild: String,

    /// List the icons once at startup instead of on every sprite build.
    #[arg(long)]
    snapshot_icons: bool,

    /// Write the task timings of the build as a Mermaid diagram.
    #[arg(long, value_name = "FILE")]
    timings: Option<Utf8PathBuf>,
}

impl Args {
    fn config(&self) -> BuildConfig {
        let mut config = BuildConfig::new(self.dev, self.sourcemaps)
            .with_root(&self.root)
            .with_esbuild(&self.esbuild)
            .with_server(ServerConfig {
                port: self.port,
                reload_port: self.reload_port,
            });

        if !self.browsers.is_empty() {
            config = config.with_browsers(&self.browsers);
        }

        if self.snapshot_icons {
            config = config.with_icon_listing(IconListing::Snapshot);
        }

        config
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tsumugi::init_logging()?;

    let project = Project::new(args.config())?;

    match args.task {
        Command::Graph => {
            print!("{}", project.graph());
        }
        Command::Default => {
            let run = project.build()?;
            write_timings(&args, &project, &run)?;

            if project.config().dev {
                project.watch()?;
            }
        }
        Command::Watch => {
            let run = project.build()?;
            write_timings(&args, &project, &run)?;
            project.watch()?;
        }
        command => {
            if let Some(task) = command.task() {
                let run = project.run(task)?;
                write_timings(&args, &project, &run)?;
            }
        }
    }

    Ok(())
}

fn write_timings(args: &Args, project: &Project, run: &Run) -> anyhow::Result<()> {
    if let Some(path) = &args.timings {
        std::fs::write(path, run.diagnostics.render_mermaid(project.graph()))?;
        tracing::info!("wrote timings to {path}");
    }

    Ok(())
}
