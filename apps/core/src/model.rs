pub type Generation = u64;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionHandle {
    #[default]
    None,
    OpenPath {
        path: String,
    },
    OpenUrl {
        url: String,
    },
    Command {
        command: String,
        args: Vec<String>,
    },
    ChangeQuery {
        query: String,
    },
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub title: String,
    pub subtitle: String,
    pub icon: String,
    pub action: ActionHandle,
    pub score: i64,
    pub history_key: Option<String>,
    pub source_id: String,
    pub generation: Generation,
}

impl ResultItem {
    pub fn new(title: &str, subtitle: &str) -> Self {
        Self::from_owned(title.to_string(), subtitle.to_string())
    }

    pub fn from_owned(title: String, subtitle: String) -> Self {
        Self {
            title,
            subtitle,
            icon: String::new(),
            action: ActionHandle::None,
            score: 0,
            history_key: None,
            source_id: String::new(),
            generation: 0,
        }
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }

    pub fn with_icon(mut self, icon: &str) -> Self {
        self.icon = icon.to_string();
        self
    }

    pub fn with_action(mut self, action: ActionHandle) -> Self {
        self.action = action;
        self
    }

    pub fn with_history_key(mut self, key: &str) -> Self {
        self.history_key = Some(key.to_string());
        self
    }

    // Falls back to title + subtitle when the source gave no key.
    pub fn item_key(&self) -> String {
        match &self.history_key {
            Some(key) => key.clone(),
            None => format!("{}\u{1f}{}", self.title, self.subtitle),
        }
    }

    pub fn same_entity(&self, other: &ResultItem) -> bool {
        self.title == other.title && self.subtitle == other.subtitle
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedResult {
    pub item: ResultItem,
    pub score: i64,
    pub pinned: bool,
}

impl RankedResult {
    pub fn title(&self) -> &str {
        &self.item.title
    }

    pub fn subtitle(&self) -> &str {
        &self.item.subtitle
    }

    pub fn source_id(&self) -> &str {
        &self.item.source_id
    }

    pub fn generation(&self) -> Generation {
        self.item.generation
    }
}
