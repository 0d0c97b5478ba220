mod catalog;
mod config;
mod dispatch;
mod error;
mod executor;
mod helper;
mod matcher;
mod menu;
mod model;
mod permissions;
mod protocol;
mod selection;
mod settings;
mod state;
mod store;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::catalog::AppCatalog;
use crate::config::load_config;
use crate::dispatch::{CommandDispatcher, SystemPlatform};
use crate::menu::{MenuIcon, Surface, build_menu};
use crate::model::{Action, AppCategory, Condition, Flag, InstalledApp, MenuItem};
use crate::permissions::{LoginItem, PermissionMonitor, SystemProbe};
use crate::protocol::{CommandChannel, SignalNotifier};
use crate::selection::FinderSelection;
use crate::settings::Settings;
use crate::state::AppListState;
use crate::store::ConfigStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

/// The Finder selection, as handed over by the host.
#[derive(clap::Args, Debug)]
struct SelectionArgs {
    /// Folder shown in the Finder window
    #[arg(long)]
    target: Option<PathBuf>,
    /// Selected items
    paths: Vec<PathBuf>,
}

impl SelectionArgs {
    fn selection(self) -> FinderSelection {
        FinderSelection::new(self.paths, self.target)
    }
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the menu for a surface
    Menu {
        #[arg(long, value_enum, default_value = "items")]
        surface: Surface,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Run the entry behind a menu tag
    Activate {
        #[arg(long)]
        tag: usize,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Edit the configured menu entries
    Items {
        #[command(subcommand)]
        command: ItemsCmd,
    },
    /// Installed applications and their categories
    Apps {
        #[command(subcommand)]
        command: AppsCmd,
    },
    /// Run the background helper
    Helper,
    /// Show extension, disk access and helper status
    Status {
        /// Installed FinderPlus.app bundle
        #[arg(long, default_value = "/Applications/FinderPlus.app")]
        app_bundle: PathBuf,
    },
    /// Enable or disable the Finder extension
    Extension {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Register or unregister the helper as a login item
    Login {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ItemsCmd {
    List,
    Reset,
    Add {
        action: Action,
        /// Bundle id of the application for `open`
        #[arg(long)]
        app: Option<String>,
        /// Insert after this entry
        #[arg(long)]
        after: Option<Uuid>,
    },
    Remove {
        id: Uuid,
    },
    Move {
        from: usize,
        to: usize,
    },
    Set {
        id: Uuid,
        flag: Flag,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
    Conditions {
        id: Uuid,
        conditions: Vec<Condition>,
    },
}

#[derive(Subcommand, Debug)]
enum AppsCmd {
    Scan {
        #[arg(short, long)]
        query: Option<String>,
    },
    Assign {
        bundle_id: String,
        category: AppCategory,
    },
    Unassign {
        bundle_id: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // 1. Load Config
    let config = load_config(args.config.as_deref())?;

    // 2. Open the shared store
    let store = ConfigStore::open(config.store_dir(), &config.general.key_prefix)
        .with_context(|| format!("opening shared store {:?}", config.store_dir()))?;
    let settings = Settings::new(store.clone());

    match args.command {
        Cmd::Menu { surface, selection } => {
            let ctx = selection.selection().context();
            for entry in build_menu(&settings.menu_items(), surface, &ctx) {
                let icon = match entry.icon {
                    MenuIcon::Symbol(s) => s,
                    MenuIcon::App(Some(id)) => format!("app:{id}"),
                    MenuIcon::App(None) => "app".to_string(),
                };
                println!("{}\t{}\t{}", entry.tag, entry.label, icon);
            }
        }
        Cmd::Activate { tag, selection } => {
            let channel = CommandChannel::new(store.clone(), SignalNotifier::new(store.dir()));
            let dispatcher = CommandDispatcher::new(config.clone(), channel, SystemPlatform);
            dispatcher.activate(&settings.menu_items(), tag, &selection.selection());
        }
        Cmd::Items { command } => run_items(&settings, &config, command)?,
        Cmd::Apps { command } => run_apps(&settings, &config, command)?,
        Cmd::Helper => helper::run(config, store)?,
        Cmd::Status { app_bundle } => {
            let monitor = PermissionMonitor::new(SystemProbe::from_config(&config, &app_bundle));
            if let Some(snapshot) = monitor.refresh() {
                println!("extension:        {:?}", snapshot.extension);
                println!("full disk access: {}", snapshot.full_disk_access);
                println!("helper:           {:?}", snapshot.helper);
            }
        }
        Cmd::Extension { enabled } => {
            permissions::set_extension_enabled(&config.extension_bundle_id(), enabled)?;
        }
        Cmd::Login { enabled } => {
            let item = LoginItem::for_config(&config).context("no home directory")?;
            if enabled {
                item.register(&std::env::current_exe()?)?;
            } else {
                item.unregister()?;
            }
        }
    }

    Ok(())
}

fn print_items(items: &[MenuItem]) {
    for (index, item) in items.iter().enumerate() {
        let flags = format!(
            "{}{}{}",
            if item.is_enabled { 'E' } else { '-' },
            if item.is_toolbar_enabled { 'T' } else { '-' },
            if item.is_context_enabled { 'C' } else { '-' },
        );
        let conditions: Vec<&str> = item.conditions.iter().map(Condition::as_str).collect();
        println!(
            "{index}\t{}\t{flags}\t{}\t{}\t[{}]",
            item.id,
            item.action.as_str(),
            menu::label_for(item),
            conditions.join(",")
        );
    }
}

fn find_app(config: &config::Config, bundle_id: &str) -> Option<InstalledApp> {
    AppCatalog::from_config(config)
        .scan()
        .into_iter()
        .find(|a| a.bundle_id == bundle_id)
}

fn run_items(settings: &Settings, config: &config::Config, command: ItemsCmd) -> Result<()> {
    match command {
        ItemsCmd::List => {}
        ItemsCmd::Reset => settings.reset_menu_items()?,
        ItemsCmd::Add { action, app, after } => {
            let template = MenuItem::template(action);
            let item = match (action, app) {
                (Action::Open, Some(bundle_id)) => {
                    let category = settings
                        .categories()
                        .category_of(&bundle_id)
                        .with_context(|| format!("{bundle_id} is not assigned to a category"))?;
                    let app = find_app(config, &bundle_id).unwrap_or_else(|| InstalledApp {
                        name: bundle_id.clone(),
                        bundle_id: bundle_id.clone(),
                        version: String::new(),
                        install_path: PathBuf::new(),
                        icon: None,
                    });
                    MenuItem::from_template(&template, Some((&app, category)))
                }
                (Action::Open, None) => bail!("open entries need --app <bundle id>"),
                _ => MenuItem::from_template(&template, None),
            };
            settings.update_menu_items(|items| model::insert_after(items, after, item))?;
        }
        ItemsCmd::Remove { id } => {
            settings.update_menu_items(|items| model::remove(items, id))?;
        }
        ItemsCmd::Move { from, to } => {
            if !settings.update_menu_items(|items| model::move_item(items, from, to))? {
                bail!("index out of range");
            }
        }
        ItemsCmd::Set { id, flag, value } => {
            let found = settings.update_menu_items(|items| {
                items.iter_mut().find(|i| i.id == id).map(|i| i.set_flag(flag, value)).is_some()
            })?;
            if !found {
                bail!("no entry {id}");
            }
        }
        ItemsCmd::Conditions { id, conditions } => {
            let found = settings.update_menu_items(|items| {
                items
                    .iter_mut()
                    .find(|i| i.id == id)
                    .map(|i| i.conditions = conditions.into_iter().collect())
                    .is_some()
            })?;
            if !found {
                bail!("no entry {id}");
            }
        }
    }
    print_items(&settings.menu_items());
    Ok(())
}

fn run_apps(settings: &Settings, config: &config::Config, command: AppsCmd) -> Result<()> {
    match command {
        AppsCmd::Scan { query } => {
            let rx = AppCatalog::from_config(config).scan_in_background();
            let mut state = AppListState::new(settings.categories());
            state.begin_loading();
            state.set_apps(rx.recv().context("application scan did not finish")?);
            if let Some(query) = query {
                state.update_query(&query);
            }

            for category in AppCategory::ALL {
                println!("{}:", category.display_name());
                for app in state.apps_in(category) {
                    println!("  {}\t{}\t{}", app.name, app.bundle_id, app.version);
                }
            }
            println!("Available:");
            for app in state.visible() {
                println!("  {}\t{}\t{}\t{}", app.name, app.bundle_id, app.version, app.install_path.display());
            }
        }
        AppsCmd::Assign { bundle_id, category } => settings.assign_category(&bundle_id, category)?,
        AppsCmd::Unassign { bundle_id } => {
            if !settings.unassign(&bundle_id)? {
                bail!("{bundle_id} is not assigned");
            }
        }
    }
    Ok(())
}
