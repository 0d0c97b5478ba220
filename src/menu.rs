use crate::model::{Action, Condition, MenuItem};
use crate::selection::SelectionContext;
use clap::ValueEnum;
use uuid::Uuid;

/// Which native menu the host is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Surface {
    Toolbar,
    #[value(name = "items")]
    ItemContext,
    #[value(name = "container")]
    ContainerContext,
    #[value(name = "sidebar")]
    SidebarContext,
}

impl Surface {
    pub fn is_context(&self) -> bool {
        !matches!(self, Surface::Toolbar)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuIcon {
    Symbol(String),
    /// Icon of the bound application, looked up by the host.
    App(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableMenuEntry {
    /// Index into the stored sequence; routes the activation callback back.
    pub tag: usize,
    pub id: Uuid,
    pub label: String,
    pub icon: MenuIcon,
}

impl Condition {
    pub fn is_satisfied(&self, ctx: &SelectionContext) -> bool {
        let single = ctx.selected_count == 1;
        match self {
            Condition::SingleOnly => single,
            Condition::MultipleOnly => ctx.selected_count > 1,
            Condition::SingleOrBlankOnly => ctx.selected_count <= 1,
            Condition::FolderOnly => single && ctx.is_single_folder,
            Condition::FileOnly => single && ctx.is_single_file,
        }
    }
}

fn passes_surface(item: &MenuItem, surface: Surface) -> bool {
    if surface.is_context() {
        item.is_context_enabled
    } else {
        item.is_toolbar_enabled
    }
}

pub fn is_visible(item: &MenuItem, surface: Surface, ctx: &SelectionContext) -> bool {
    if !item.is_enabled || !passes_surface(item, surface) {
        return false;
    }
    // The toolbar has no selection to test against.
    if !surface.is_context() {
        return true;
    }
    item.conditions.iter().all(|c| c.is_satisfied(ctx))
}

pub fn label_for(item: &MenuItem) -> String {
    match item.action {
        Action::Open => format!("Open with {}", item.app_name.as_deref().unwrap_or("Application")),
        _ => item.title.clone(),
    }
}

pub fn icon_for(item: &MenuItem) -> MenuIcon {
    match item.action {
        Action::Open => MenuIcon::App(item.app_bundle_id.clone()),
        _ => MenuIcon::Symbol(item.icon.clone()),
    }
}

/// Filters `entries` for `surface`, keeping stored order.
pub fn build_menu(entries: &[MenuItem], surface: Surface, ctx: &SelectionContext) -> Vec<RenderableMenuEntry> {
    let menu: Vec<RenderableMenuEntry> = entries
        .iter()
        .enumerate()
        .filter(|(_, item)| is_visible(item, surface, ctx))
        .map(|(tag, item)| RenderableMenuEntry {
            tag,
            id: item.id,
            label: label_for(item),
            icon: icon_for(item),
        })
        .collect();
    log::debug!("MenuBuilder: {:?} -> {} of {} entries", surface, menu.len(), entries.len());
    menu
}
