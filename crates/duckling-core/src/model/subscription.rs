use std::fmt;
use std::sync::Arc;

/// Called once on registration with `(subscription_id, table_spec_name)`
pub type OnSubscribe = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Called on every new version with `(table_instance_name, table_version_id, is_versioned)`
pub type OnChange = Arc<dyn Fn(&str, u64, bool) + Send + Sync>;

/// A registered callback pair for one logical table
#[derive(Clone)]
pub struct CatalogSubscription {
    /// Registry key; defaults to `table_spec_name` when absent
    pub subscription_id: Option<String>,
    pub table_spec_name: String,
    pub on_subscribe: Option<OnSubscribe>,
    pub on_change: OnChange,
}

impl CatalogSubscription {
    pub fn new<F>(table_spec_name: impl Into<String>, on_change: F) -> Self
    where
        F: Fn(&str, u64, bool) + Send + Sync + 'static,
    {
        Self {
            subscription_id: None,
            table_spec_name: table_spec_name.into(),
            on_subscribe: None,
            on_change: Arc::new(on_change),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.subscription_id = Some(id.into());
        self
    }

    pub fn with_on_subscribe<F>(mut self, on_subscribe: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.on_subscribe = Some(Arc::new(on_subscribe));
        self
    }

    /// Effective registry key
    pub fn id(&self) -> &str {
        self.subscription_id
            .as_deref()
            .unwrap_or(&self.table_spec_name)
    }
}

impl fmt::Debug for CatalogSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogSubscription")
            .field("subscription_id", &self.id())
            .field("table_spec_name", &self.table_spec_name)
            .finish_non_exhaustive()
    }
}
