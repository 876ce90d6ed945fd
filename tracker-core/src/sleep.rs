//! Task identities and the readiness set used by the sleep rendezvous.

/// The cooperating tasks of the tracker.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TaskId {
    Orchestrator,
    SensorSampler,
    AudioPlayer,
    CommandPoller,
    CloudSync,
    ConfigWatcher,
}

impl TaskId {
    pub const ALL: [Self; 6] = [
        Self::Orchestrator,
        Self::SensorSampler,
        Self::AudioPlayer,
        Self::CommandPoller,
        Self::CloudSync,
        Self::ConfigWatcher,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::SensorSampler => "sensor",
            Self::AudioPlayer => "audio",
            Self::CommandPoller => "command",
            Self::CloudSync => "cloud",
            Self::ConfigWatcher => "config",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of tasks that reported sleep readiness.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadySet(u8);

impl ReadySet {
    pub const EMPTY: Self = Self(0);
    /// Every task participates in the rendezvous.
    pub const ALL: Self = Self(0b0011_1111);

    #[must_use]
    pub const fn with(self, task: TaskId) -> Self {
        Self(self.0 | task.bit())
    }

    #[must_use]
    pub const fn contains(self, task: TaskId) -> bool {
        self.0 & task.bit() != 0
    }

    #[must_use]
    pub const fn is_superset_of(self, required: Self) -> bool {
        self.0 & required.0 == required.0
    }

    /// Required tasks that have not reported yet.
    pub fn missing(self, required: Self) -> impl Iterator<Item = TaskId> {
        TaskId::ALL
            .into_iter()
            .filter(move |task| required.contains(*task) && !self.contains(*task))
    }
}
