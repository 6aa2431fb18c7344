//! Identifier generation facade.
//!
//! `next` resolves the scope, increments its counter, loads the family's
//! format configuration and renders the identifier. All state lives in the
//! counter store; the generator itself holds none between calls.

mod clock;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};

pub use clock::{Clock, ManualClock, SystemClock};

use crate::contracts::{
    CounterRecord, CounterStore, Family, FormatConfig, FormatConfigSource, GenerateError,
    GeneratedIdentifier, ReservedSequence, ScopeError, ScopeKind, StorageError,
};
use crate::format::format_identifier;
use crate::scope::{parse_key, validate_namespace, ResolvedScope, ScopeResolver};

/// Configuration for the identifier generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Timezone scopes are resolved in.
    pub resolver: ScopeResolver,
    /// Upper bound on a single counter store call.
    pub store_timeout: Duration,
    /// Families served by this generator.
    pub families: Vec<Family>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            resolver: ScopeResolver::utc(),
            store_timeout: Duration::from_secs(2),
            families: vec![Family::new("mr", "MR"), Family::new("token", "TKN")],
        }
    }
}

impl GeneratorConfig {
    /// Creates a config from environment variables.
    ///
    /// Environment variables:
    /// - `MEDSEQ_UTC_OFFSET_MINUTES`: Local timezone as minutes east of UTC (default: 0)
    /// - `MEDSEQ_STORE_TIMEOUT_MS`: Counter store timeout in ms (default: 2000)
    /// - `MEDSEQ_FAMILIES`: `name=PREFIX` list (default: `mr=MR,token=TKN`)
    pub fn from_env() -> Self {
        let default = Self::default();

        let resolver = match std::env::var("MEDSEQ_UTC_OFFSET_MINUTES")
            .ok()
            .and_then(|v| v.trim().parse::<i32>().ok())
        {
            Some(minutes) => ScopeResolver::from_offset_minutes(minutes).unwrap_or_else(|| {
                tracing::warn!(minutes, "UTC offset out of range, using UTC");
                default.resolver
            }),
            None => default.resolver,
        };

        let store_timeout = std::env::var("MEDSEQ_STORE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(default.store_timeout);

        let families = std::env::var("MEDSEQ_FAMILIES")
            .ok()
            .map(|v| Family::parse_list(&v))
            .filter(|f| !f.is_empty())
            .unwrap_or(default.families);

        Self {
            resolver,
            store_timeout,
            families,
        }
    }
}

/// Issues formatted identifiers for a set of families.
pub struct IdentifierGenerator<S, C, K = SystemClock> {
    store: Arc<S>,
    config_source: Arc<C>,
    clock: K,
    resolver: ScopeResolver,
    families: BTreeMap<String, Family>,
    store_timeout: Duration,
}

impl<S, C> IdentifierGenerator<S, C, SystemClock>
where
    S: CounterStore + 'static,
    C: FormatConfigSource,
{
    /// Creates a generator on the system clock. Fails if a family name is not
    /// a valid scope namespace.
    pub fn new(
        store: Arc<S>,
        config_source: Arc<C>,
        config: GeneratorConfig,
    ) -> Result<Self, GenerateError> {
        let mut families = BTreeMap::new();
        for family in config.families {
            validate_namespace(&family.name)?;
            families.insert(family.name.clone(), family);
        }

        Ok(Self {
            store,
            config_source,
            clock: SystemClock,
            resolver: config.resolver,
            families,
            store_timeout: config.store_timeout,
        })
    }
}

impl<S, C, K> IdentifierGenerator<S, C, K>
where
    S: CounterStore + 'static,
    C: FormatConfigSource,
    K: Clock,
{
    /// Replaces the clock `next` and `preview` read.
    pub fn with_clock<K2: Clock>(self, clock: K2) -> IdentifierGenerator<S, C, K2> {
        IdentifierGenerator {
            store: self.store,
            config_source: self.config_source,
            clock,
            resolver: self.resolver,
            families: self.families,
            store_timeout: self.store_timeout,
        }
    }

    pub fn resolver(&self) -> &ScopeResolver {
        &self.resolver
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn families(&self) -> impl Iterator<Item = &Family> {
        self.families.values()
    }

    pub fn family(&self, name: &str) -> Result<&Family, GenerateError> {
        self.families
            .get(name)
            .ok_or_else(|| GenerateError::UnknownFamily(name.to_string()))
    }

    /// Issues the next identifier for `family` in the scope of the current instant.
    pub async fn next(
        &self,
        family: &str,
        kind: ScopeKind,
        department: Option<&str>,
    ) -> Result<GeneratedIdentifier, GenerateError> {
        self.next_at(family, kind, department, self.clock.now()).await
    }

    /// Issues the next identifier in the scope `now` resolves to.
    ///
    /// On `StorageUnavailable` nothing was issued. On `ConfigUnavailable` the
    /// counter was already advanced; the error carries the reservation so it
    /// can be rendered with [`render`](Self::render) instead of calling `next`
    /// again.
    pub async fn next_at(
        &self,
        family: &str,
        kind: ScopeKind,
        department: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GeneratedIdentifier, GenerateError> {
        let family = self.family(family)?;
        let scope = self.resolver.resolve(&family.name, kind, now, department)?;

        let key = scope.key.clone();
        let sequence = self
            .run_store(move |store| store.increment(&key))
            .await
            .map_err(|e| {
                tracing::error!(
                    family = %family.name,
                    scope = %scope.key,
                    error = %e,
                    "Counter increment failed, nothing issued"
                );
                GenerateError::StorageUnavailable(e)
            })?;

        let reserved = ReservedSequence {
            family: family.name.clone(),
            scope: scope.key,
            sequence,
            year: scope.year,
        };
        let formatted = self.render_reserved(family, &reserved)?;

        tracing::debug!(
            family = %family.name,
            scope = %reserved.scope,
            sequence,
            formatted = %formatted,
            "Issued identifier"
        );

        Ok(GeneratedIdentifier {
            scope: reserved.scope,
            sequence,
            formatted,
        })
    }

    /// Renders a reservation left behind by `ConfigUnavailable`.
    ///
    /// Reads the counter but never increments it. The reservation must name a
    /// scope of this family, carry the year of a daily scope's date, and a
    /// sequence the scope has already committed; anything else is an
    /// `InvalidRequest`. Rendering a committed value twice yields the same
    /// identifier, so this cannot mint a new one.
    pub async fn render(&self, reserved: &ReservedSequence) -> Result<String, GenerateError> {
        let family = self.family(&reserved.family)?;
        let parsed = parse_key(&reserved.scope)?;

        if parsed.namespace != family.name {
            return Err(ScopeError::ForeignScope {
                scope: reserved.scope.to_string(),
                family: family.name.clone(),
            }
            .into());
        }
        if let Some(date) = parsed.date {
            if date.year() != reserved.year {
                return Err(ScopeError::YearMismatch {
                    scope: reserved.scope.to_string(),
                    year: reserved.year,
                }
                .into());
            }
        }

        let key = reserved.scope.clone();
        let committed = self.run_store(move |store| store.current(&key)).await?;
        if reserved.sequence == 0 || reserved.sequence > committed {
            tracing::warn!(
                family = %family.name,
                scope = %reserved.scope,
                sequence = reserved.sequence,
                committed,
                "Rejected render of an unreserved sequence"
            );
            return Err(ScopeError::NotReserved {
                scope: reserved.scope.to_string(),
                sequence: reserved.sequence,
            }
            .into());
        }

        self.render_reserved(family, reserved)
    }

    /// Returns the identifier the next call would issue if nobody else
    /// increments the scope first. Does not mutate the counter.
    pub async fn preview(
        &self,
        family: &str,
        kind: ScopeKind,
        department: Option<&str>,
    ) -> Result<GeneratedIdentifier, GenerateError> {
        self.preview_at(family, kind, department, self.clock.now())
            .await
    }

    pub async fn preview_at(
        &self,
        family: &str,
        kind: ScopeKind,
        department: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GeneratedIdentifier, GenerateError> {
        let family = self.family(family)?;
        let ResolvedScope { key, year, .. } =
            self.resolver.resolve(&family.name, kind, now, department)?;

        let lookup = key.clone();
        let current = self.run_store(move |store| store.current(&lookup)).await?;
        let sequence = current
            .checked_add(1)
            .ok_or_else(|| StorageError::Overflow(key.to_string()))?;

        let config = self.config_source.load(&family.name)?;
        let formatted = format_identifier(&config, &family.default_prefix, sequence, year);

        Ok(GeneratedIdentifier {
            scope: key,
            sequence,
            formatted,
        })
    }

    /// Returns the stored format configuration for `family`.
    pub fn config(&self, family: &str) -> Result<FormatConfig, GenerateError> {
        let family = self.family(family)?;
        Ok(self.config_source.load(&family.name)?)
    }

    /// Validates and stores a new format configuration for `family`.
    pub fn update_config(&self, family: &str, config: FormatConfig) -> Result<(), GenerateError> {
        let family = self.family(family)?;
        self.config_source.store(&family.name, config)?;
        Ok(())
    }

    /// Lists every committed counter.
    pub async fn records(&self) -> Result<Vec<CounterRecord>, GenerateError> {
        Ok(self.run_store(|store| store.records()).await?)
    }

    /// Checks that the counter store is reachable.
    pub async fn ping(&self) -> Result<(), GenerateError> {
        Ok(self.run_store(|store| store.ping()).await?)
    }

    fn render_reserved(
        &self,
        family: &Family,
        reserved: &ReservedSequence,
    ) -> Result<String, GenerateError> {
        let config = self.config_source.load(&family.name).map_err(|e| {
            tracing::warn!(
                family = %family.name,
                scope = %reserved.scope,
                sequence = reserved.sequence,
                error = %e,
                "Sequence reserved but not rendered"
            );
            GenerateError::ConfigUnavailable {
                reserved: reserved.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(format_identifier(
            &config,
            &family.default_prefix,
            reserved.sequence,
            reserved.year,
        ))
    }

    /// Runs a store call on the blocking pool, bounded by the store timeout.
    ///
    /// A call that times out or whose caller goes away still runs to
    /// completion; a committed increment is then skipped, never reissued.
    async fn run_store<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T, StorageError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || op(&store));

        match tokio::time::timeout(self.store_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(StorageError::Io(format!("Counter store task failed: {}", e))),
            Err(_) => Err(StorageError::Timeout(self.store_timeout)),
        }
    }
}
