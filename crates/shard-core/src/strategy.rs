//! Pluggable sharding-key strategies and the factory registry.
//!
//! A strategy maps a sharding-key value (or a bounded value range) to the
//! index of a physical table partition. Strategies are built once from
//! declarative properties at configuration load and shared read-only across
//! all concurrent statement analyses.

use std::{collections::HashMap, fmt, sync::Arc};

use serde_json::Value;

use crate::error::ShardingError;

/// Declarative key/value properties handed to a strategy factory.
pub type Properties = HashMap<String, Value>;

/// A sharding-key value extracted from a statement predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardKey {
    Int(i64),
    Uint(u64),
    Text(String),
}

/// Maps sharding-key values to physical table indexes.
pub trait ShardingStrategy: fmt::Debug + Send + Sync {
    /// Physical table index for a single key value.
    fn shard_index(&self, key: &ShardKey) -> Result<usize, ShardingError>;

    /// Candidate indexes for a bounded key range. The default scatters to
    /// every partition; strategies that can narrow the range override this.
    fn shard_range(&self, low: &ShardKey, high: &ShardKey) -> Result<Vec<usize>, ShardingError> {
        let _ = (low, high);
        Ok((0..self.shard_count()).collect())
    }

    /// Number of physical partitions this strategy distributes across.
    fn shard_count(&self) -> usize;
}

/// Builds strategy instances from declarative properties.
pub trait StrategyFactory: Send + Sync {
    /// Strategy identifier, unique across the registry.
    fn name(&self) -> &str;

    fn create_strategy(
        &self,
        properties: &Properties,
    ) -> Result<Arc<dyn ShardingStrategy>, ShardingError>;
}

/// Name → factory map. `Default` pre-registers the built-in factories.
pub struct StrategyRegistry {
    factories: HashMap<String, Arc<dyn StrategyFactory>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory, replacing any previous one under the same name.
    pub fn register(&mut self, factory: Arc<dyn StrategyFactory>) {
        self.factories.insert(factory.name().to_owned(), factory);
    }

    pub fn create(
        &self,
        name: &str,
        properties: &Properties,
    ) -> Result<Arc<dyn ShardingStrategy>, ShardingError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ShardingError::UnknownStrategy(name.to_owned()))?;
        factory.create_strategy(properties)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(NoneFactory));
        registry.register(Arc::new(ModFactory));
        registry.register(Arc::new(Crc32ModFactory));
        registry
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Degenerate strategy for unsharded tables: every row lands on index 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneStrategy;

impl ShardingStrategy for NoneStrategy {
    fn shard_index(&self, _key: &ShardKey) -> Result<usize, ShardingError> {
        Ok(0)
    }

    fn shard_count(&self) -> usize {
        1
    }
}

pub const NONE_STRATEGY: &str = "none";

pub struct NoneFactory;

impl StrategyFactory for NoneFactory {
    fn name(&self) -> &str {
        NONE_STRATEGY
    }

    fn create_strategy(
        &self,
        _properties: &Properties,
    ) -> Result<Arc<dyn ShardingStrategy>, ShardingError> {
        Ok(Arc::new(NoneStrategy))
    }
}

/// Integer modulo over the configured partition count.
#[derive(Debug, Clone, Copy)]
pub struct ModStrategy {
    count: usize,
}

impl ShardingStrategy for ModStrategy {
    fn shard_index(&self, key: &ShardKey) -> Result<usize, ShardingError> {
        match key {
            ShardKey::Int(v) => Ok(v.rem_euclid(self.count as i64) as usize),
            ShardKey::Uint(v) => Ok((v % self.count as u64) as usize),
            ShardKey::Text(_) => Err(ShardingError::UnsupportedShardingSyntax(
                "mod strategy requires an integer sharding key".into(),
            )),
        }
    }

    fn shard_range(&self, low: &ShardKey, high: &ShardKey) -> Result<Vec<usize>, ShardingError> {
        let (low, high) = match (low, high) {
            (ShardKey::Int(a), ShardKey::Int(b)) => (*a, *b),
            // Bounds beyond i64 cannot be enumerated exactly; scatter.
            (ShardKey::Uint(a), ShardKey::Uint(b)) => {
                match (i64::try_from(*a), i64::try_from(*b)) {
                    (Ok(a), Ok(b)) => (a, b),
                    _ => return Ok((0..self.count).collect()),
                }
            }
            _ => return Ok((0..self.count).collect()),
        };
        if low > high {
            return Ok(Vec::new());
        }
        // A range spanning at least `count` values touches every partition.
        if (high as i128 - low as i128) + 1 >= self.count as i128 {
            return Ok((0..self.count).collect());
        }
        let mut indexes: Vec<usize> = (low..=high)
            .map(|v| v.rem_euclid(self.count as i64) as usize)
            .collect();
        indexes.sort_unstable();
        indexes.dedup();
        Ok(indexes)
    }

    fn shard_count(&self) -> usize {
        self.count
    }
}

pub const MOD_STRATEGY: &str = "mod";

pub struct ModFactory;

impl StrategyFactory for ModFactory {
    fn name(&self) -> &str {
        MOD_STRATEGY
    }

    fn create_strategy(
        &self,
        properties: &Properties,
    ) -> Result<Arc<dyn ShardingStrategy>, ShardingError> {
        let count = sharding_count(properties)?;
        Ok(Arc::new(ModStrategy { count }))
    }
}

/// CRC32 of the key bytes modulo the configured partition count. Accepts any
/// key type, so it also covers text sharding keys.
#[derive(Debug, Clone, Copy)]
pub struct Crc32ModStrategy {
    count: usize,
}

impl ShardingStrategy for Crc32ModStrategy {
    fn shard_index(&self, key: &ShardKey) -> Result<usize, ShardingError> {
        let checksum = match key {
            ShardKey::Int(v) => crc32fast::hash(&v.to_be_bytes()),
            ShardKey::Uint(v) => crc32fast::hash(&v.to_be_bytes()),
            ShardKey::Text(v) => crc32fast::hash(v.as_bytes()),
        };
        Ok((checksum as u64 % self.count as u64) as usize)
    }

    fn shard_count(&self) -> usize {
        self.count
    }
}

pub const CRC32_MOD_STRATEGY: &str = "crc32_mod";

pub struct Crc32ModFactory;

impl StrategyFactory for Crc32ModFactory {
    fn name(&self) -> &str {
        CRC32_MOD_STRATEGY
    }

    fn create_strategy(
        &self,
        properties: &Properties,
    ) -> Result<Arc<dyn ShardingStrategy>, ShardingError> {
        let count = sharding_count(properties)?;
        Ok(Arc::new(Crc32ModStrategy { count }))
    }
}

fn sharding_count(properties: &Properties) -> Result<usize, ShardingError> {
    let value = properties.get("sharding_count").ok_or_else(|| {
        ShardingError::InvalidStrategyConfig("missing required property 'sharding_count'".into())
    })?;
    let count = value.as_u64().ok_or_else(|| {
        ShardingError::InvalidStrategyConfig(format!(
            "property 'sharding_count' must be a positive integer, got {value}"
        ))
    })?;
    if count == 0 {
        return Err(ShardingError::InvalidStrategyConfig(
            "property 'sharding_count' must be at least 1".into(),
        ));
    }
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(count: i64) -> Properties {
        let mut p = Properties::new();
        p.insert("sharding_count".into(), json!(count));
        p
    }

    #[test]
    fn none_strategy_pins_every_key_to_index_zero() {
        let strategy = StrategyRegistry::default()
            .create(NONE_STRATEGY, &Properties::new())
            .unwrap();
        assert_eq!(strategy.shard_index(&ShardKey::Int(42)).unwrap(), 0);
        assert_eq!(
            strategy.shard_index(&ShardKey::Text("abc".into())).unwrap(),
            0
        );
        assert_eq!(strategy.shard_count(), 1);
    }

    #[test]
    fn mod_strategy_wraps_negative_keys() {
        let strategy = StrategyRegistry::default()
            .create(MOD_STRATEGY, &props(8))
            .unwrap();
        assert_eq!(strategy.shard_index(&ShardKey::Int(11)).unwrap(), 3);
        assert_eq!(strategy.shard_index(&ShardKey::Int(-1)).unwrap(), 7);
        assert_eq!(strategy.shard_index(&ShardKey::Uint(16)).unwrap(), 0);
    }

    #[test]
    fn mod_strategy_rejects_text_keys() {
        let strategy = StrategyRegistry::default()
            .create(MOD_STRATEGY, &props(4))
            .unwrap();
        let err = strategy
            .shard_index(&ShardKey::Text("not-a-number".into()))
            .unwrap_err();
        assert!(matches!(err, ShardingError::UnsupportedShardingSyntax(_)));
    }

    #[test]
    fn mod_range_narrows_small_spans_and_scatters_wide_ones() {
        let strategy = ModStrategy { count: 8 };
        assert_eq!(
            strategy
                .shard_range(&ShardKey::Int(10), &ShardKey::Int(12))
                .unwrap(),
            vec![2, 3, 4]
        );
        assert_eq!(
            strategy
                .shard_range(&ShardKey::Int(0), &ShardKey::Int(100))
                .unwrap(),
            (0..8).collect::<Vec<_>>()
        );
        assert!(strategy
            .shard_range(&ShardKey::Int(5), &ShardKey::Int(3))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn mod_range_scatters_unsigned_bounds_past_i64() {
        let strategy = ModStrategy { count: 8 };
        let low = ShardKey::Uint(i64::MAX as u64 + 1);
        let high = ShardKey::Uint(i64::MAX as u64 + 10);
        assert_eq!(
            strategy.shard_range(&low, &high).unwrap(),
            (0..8).collect::<Vec<_>>()
        );
        // Narrowing still works when both bounds fit.
        assert_eq!(
            strategy
                .shard_range(&ShardKey::Uint(10), &ShardKey::Uint(12))
                .unwrap(),
            vec![2, 3, 4]
        );
    }

    #[test]
    fn crc32_strategy_is_stable_and_in_range() {
        let strategy = StrategyRegistry::default()
            .create(CRC32_MOD_STRATEGY, &props(16))
            .unwrap();
        let key = ShardKey::Text("user-314".into());
        let first = strategy.shard_index(&key).unwrap();
        assert_eq!(strategy.shard_index(&key).unwrap(), first);
        assert!(first < 16);
    }

    #[test]
    fn missing_or_zero_count_is_invalid_config() {
        let registry = StrategyRegistry::default();
        let err = registry.create(MOD_STRATEGY, &Properties::new()).unwrap_err();
        assert!(matches!(err, ShardingError::InvalidStrategyConfig(_)));

        let err = registry.create(CRC32_MOD_STRATEGY, &props(0)).unwrap_err();
        assert!(matches!(err, ShardingError::InvalidStrategyConfig(_)));
    }

    #[test]
    fn unknown_strategy_names_are_rejected() {
        let err = StrategyRegistry::default()
            .create("range", &Properties::new())
            .unwrap_err();
        assert!(matches!(err, ShardingError::UnknownStrategy(name) if name == "range"));
    }
}
