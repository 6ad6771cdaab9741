use core::fmt;
use spin::Mutex;

/// Kernel initialization status tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed(&'static str),
}

/// Kernel component status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

impl ComponentStatus {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            status: InitStatus::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, InitStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, InitStatus::Failed(_))
    }
}

pub const MAX_COMPONENTS: usize = 16;

/// Fixed-size table so that phases running before the heap can report too.
pub struct StatusTable {
    entries: [Option<ComponentStatus>; MAX_COMPONENTS],
}

impl StatusTable {
    pub const fn new() -> Self {
        Self { entries: [None; MAX_COMPONENTS] }
    }

    /// Adds `name` as not started. Known names and a full table are ignored.
    pub fn register(&mut self, name: &'static str) {
        if self.get(name).is_some() {
            return;
        }
        if let Some(slot) = self.entries.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(ComponentStatus::new(name));
        }
    }

    pub fn update(&mut self, name: &'static str, status: InitStatus) {
        if let Some(component) = self.entries.iter_mut().flatten().find(|c| c.name == name) {
            component.status = status;
        }
    }

    pub fn get(&self, name: &str) -> Option<ComponentStatus> {
        self.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentStatus> + '_ {
        self.entries.iter().flatten().copied()
    }

    pub fn all_ready(&self) -> bool {
        self.iter().next().is_some() && self.iter().all(|c| c.is_complete())
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::new()
    }
}

static INIT_STATUS: Mutex<StatusTable> = Mutex::new(StatusTable::new());

/// Track kernel component initialization
pub fn register_component(name: &'static str) {
    INIT_STATUS.lock().register(name);
}

pub fn update_component_status(name: &'static str, status: InitStatus) {
    INIT_STATUS.lock().update(name, status);
}

pub fn component_status(name: &str) -> Option<ComponentStatus> {
    INIT_STATUS.lock().get(name)
}

/// Logs one line per registered component, then whether all of them are
/// ready.
pub fn log_summary() {
    let table = INIT_STATUS.lock();
    for component in table.iter() {
        log::info!("{:<20} {}", component.name, component.status);
    }
    if table.all_ready() {
        log::info!("all components ready");
    } else {
        log::warn!("some components are not ready");
    }
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}
