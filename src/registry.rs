//! Resolution of encoding names to converters.
//!
//! A [`Registry`] tries, in order: the system codec for names the alias table
//! routes there, the built-in factory table, persisted converters from the
//! resource store, and the system codec as a last resort. Outcomes are cached
//! per requested name, so repeated requests skip the alias lookup and the
//! tiers that already failed.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use serde::Serialize;

use crate::alias::{AliasResolver, StandardAliases};
use crate::codecs::{Builtin, default_converter};
use crate::config::Config;
use crate::converter::Converter;
use crate::store::{self, DirectoryStore, EmptyStore, ResourceStore};
use crate::system::{EncodingRsCodec, SystemCodec};
use crate::{Error, Result};

/// Creates a fresh converter for one canonical encoding.
pub type ConverterFactory = Arc<dyn Fn() -> Result<Box<dyn Converter>> + Send + Sync>;

/// Which tier produced a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    /// Registered factory
    Builtin,
    /// Loaded from the resource store
    Persisted,
    /// System codec library
    SystemCodec,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Builtin => "builtin",
            Tier::Persisted => "persisted",
            Tier::SystemCodec => "system-codec",
        })
    }
}

/// Cached outcome of resolving one requested name. Positive entries keep the
/// canonical name so a hit needs no alias lookup.
#[derive(Clone)]
enum Resolution {
    Builtin {
        canonical: String,
        factory: ConverterFactory,
    },
    NoConverter,
    UseSystemCodec {
        canonical: String,
    },
}

/// Result of trying one tier.
enum Attempt {
    Found(Box<dyn Converter>),
    NotFound,
    Transient(Error),
}

impl Attempt {
    fn from_result(result: Result<Option<Box<dyn Converter>>>) -> Self {
        match result {
            Ok(Some(conv)) => Attempt::Found(conv),
            Ok(None) => Attempt::NotFound,
            Err(e) => Attempt::Transient(e),
        }
    }
}

/// Maps encoding names to converters, caching how each name resolved.
///
/// Cheap to share between threads behind an `Arc`; every call to
/// [`resolve`](Self::resolve) hands out an independent converter.
pub struct Registry {
    aliases: Arc<dyn AliasResolver>,
    system: Arc<dyn SystemCodec>,
    store: Arc<dyn ResourceStore>,
    builtins: HashMap<String, ConverterFactory>,
    cache: DashMap<String, Resolution>,
    default_encoding: String,
}

impl Registry {
    /// Start building a registry with the built-in converters registered.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry with the standard aliases, the `encoding_rs` system codec and
    /// the store and default encoding named by `config`.
    pub fn from_config(config: &Config) -> Self {
        let builder = Registry::builder().default_encoding(config.default_encoding.clone());
        match &config.resource_dir {
            Some(dir) => builder.store(DirectoryStore::new(dir)).build(),
            None => builder.build(),
        }
    }

    /// The default encoding name captured when the registry was built.
    pub fn default_encoding(&self) -> &str {
        &self.default_encoding
    }

    /// Canonical name the alias table gives `name`.
    pub fn canonical_name(&self, name: &str) -> String {
        self.aliases.alias(name)
    }

    /// Names with a registered factory.
    pub fn builtin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builtins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of names with a cached outcome.
    pub fn cached_names(&self) -> usize {
        self.cache.len()
    }

    /// A converter for `name`, or [`Error::UnsupportedEncoding`] when no tier
    /// can provide one.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn Converter>> {
        self.resolve_with_tier(name).map(|(conv, _)| conv)
    }

    /// Like [`resolve`](Self::resolve), also reporting which tier served.
    pub fn resolve_with_tier(&self, name: &str) -> Result<(Box<dyn Converter>, Tier)> {
        self.lookup(name)
            .ok_or_else(|| Error::UnsupportedEncoding(name.to_owned()))
    }

    /// A converter for the default encoding, or the hardcoded default
    /// converter when that encoding cannot be resolved.
    pub fn get_default(&self) -> Box<dyn Converter> {
        match self.resolve(&self.default_encoding) {
            Ok(conv) => conv,
            Err(e) => {
                warn!("default encoding unavailable ({e}), using {}", Builtin::Default.name());
                default_converter()
            }
        }
    }

    /// A system codec converter for `canonical`, bypassing the cache.
    pub fn system_converter(&self, canonical: &str) -> Option<Box<dyn Converter>> {
        match self.system.construct(canonical) {
            Ok(conv) => Some(conv),
            Err(e) => {
                debug!("system codec cannot serve {}: {}", canonical, e);
                None
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<(Box<dyn Converter>, Tier)> {
        let cached = self.cache.get(name).map(|entry| entry.value().clone());
        match cached {
            Some(Resolution::NoConverter) => {
                debug!("{} cached as unsupported", name);
                return None;
            }
            Some(Resolution::UseSystemCodec { canonical }) => {
                return self
                    .system_converter(&canonical)
                    .map(|conv| (conv, Tier::SystemCodec));
            }
            Some(Resolution::Builtin { canonical, factory }) => {
                return match self.instantiate(&canonical, &factory) {
                    Attempt::Found(conv) => Some((conv, Tier::Builtin)),
                    _ => self.last_resort(name, &canonical),
                };
            }
            None => {}
        }

        let canonical = self.aliases.alias(name);
        if self.aliases.use_system_codec(&canonical) {
            return self.last_resort(name, &canonical);
        }

        match self.builtins.get(&canonical) {
            Some(factory) => {
                self.remember(
                    name,
                    Resolution::Builtin {
                        canonical: canonical.clone(),
                        factory: factory.clone(),
                    },
                );
                match self.instantiate(&canonical, factory) {
                    Attempt::Found(conv) => return Some((conv, Tier::Builtin)),
                    _ => return self.last_resort(name, &canonical),
                }
            }
            None => debug!("no built-in converter for {}", canonical),
        }

        match Attempt::from_result(store::load(self.store.as_ref(), &canonical)) {
            Attempt::Found(conv) => return Some((conv, Tier::Persisted)),
            Attempt::NotFound => debug!("no persisted converter for {}", canonical),
            Attempt::Transient(e) => debug!("persisted converter for {} unusable: {}", canonical, e),
        }

        self.last_resort(name, &canonical)
    }

    fn instantiate(&self, canonical: &str, factory: &ConverterFactory) -> Attempt {
        match factory() {
            Ok(conv) => Attempt::Found(conv),
            Err(e) => {
                debug!("built-in converter for {} failed to construct: {}", canonical, e);
                Attempt::Transient(e)
            }
        }
    }

    /// Try the system codec and cache whether the name should keep using it.
    fn last_resort(&self, name: &str, canonical: &str) -> Option<(Box<dyn Converter>, Tier)> {
        match self.system.construct(canonical) {
            Ok(conv) => {
                self.remember(
                    name,
                    Resolution::UseSystemCodec {
                        canonical: canonical.to_owned(),
                    },
                );
                Some((conv, Tier::SystemCodec))
            }
            Err(Error::UnsupportedEncoding(_)) => {
                self.remember(name, Resolution::NoConverter);
                None
            }
            Err(e) => {
                debug!("system codec failed for {}: {}", canonical, e);
                self.remember(
                    name,
                    Resolution::UseSystemCodec {
                        canonical: canonical.to_owned(),
                    },
                );
                None
            }
        }
    }

    fn remember(&self, name: &str, resolution: Resolution) {
        let label = match &resolution {
            Resolution::Builtin { .. } => "builtin",
            Resolution::NoConverter => "unsupported",
            Resolution::UseSystemCodec { .. } => "system-codec",
        };
        debug!("caching {} as {}", name, label);
        self.cache.insert(name.to_owned(), resolution);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::builder().build()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("builtins", &self.builtin_names())
            .field("cached", &self.cache.len())
            .field("default_encoding", &self.default_encoding)
            .finish()
    }
}

/// Assembles a [`Registry`] from its collaborators.
pub struct RegistryBuilder {
    aliases: Arc<dyn AliasResolver>,
    system: Arc<dyn SystemCodec>,
    store: Arc<dyn ResourceStore>,
    builtins: HashMap<String, ConverterFactory>,
    default_encoding: String,
}

impl RegistryBuilder {
    /// Standard aliases, `encoding_rs`, an empty store, every [`Builtin`].
    pub fn new() -> Self {
        let mut builder = Self {
            aliases: Arc::new(StandardAliases::new()),
            system: Arc::new(EncodingRsCodec),
            store: Arc::new(EmptyStore),
            builtins: HashMap::new(),
            default_encoding: crate::config::FALLBACK_ENCODING.to_owned(),
        };
        for builtin in Builtin::ALL {
            builder = builder.register(builtin.name(), move || Ok(builtin.converter()));
        }
        builder
    }

    /// Register `factory` for the canonical name `canonical`, replacing any
    /// earlier registration.
    pub fn register<F>(mut self, canonical: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Converter>> + Send + Sync + 'static,
    {
        self.builtins.insert(canonical.into(), Arc::new(factory));
        self
    }

    /// Drop every registered factory, including the built-ins.
    pub fn clear_builtins(mut self) -> Self {
        self.builtins.clear();
        self
    }

    /// Use `aliases` for name normalization.
    pub fn aliases(mut self, aliases: impl AliasResolver + 'static) -> Self {
        self.aliases = Arc::new(aliases);
        self
    }

    /// Use `system` as the system codec.
    pub fn system_codec(mut self, system: impl SystemCodec + 'static) -> Self {
        self.system = Arc::new(system);
        self
    }

    /// Load persisted converters from `store`.
    pub fn store(mut self, store: impl ResourceStore + 'static) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Encoding name `get_default` resolves.
    pub fn default_encoding(mut self, name: impl Into<String>) -> Self {
        self.default_encoding = name.into();
        self
    }

    /// Finish the registry.
    pub fn build(self) -> Registry {
        Registry {
            aliases: self.aliases,
            system: self.system,
            store: self.store,
            builtins: self.builtins,
            cache: DashMap::new(),
            default_encoding: self.default_encoding,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::{CharToByte, Latin1};
    use crate::store::{MemoryStore, PersistedConverter};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        alias: AtomicUsize,
        system: AtomicUsize,
        store: AtomicUsize,
    }

    impl Calls {
        fn get(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    struct CountingAliases(Arc<Calls>);

    impl AliasResolver for CountingAliases {
        fn alias(&self, name: &str) -> String {
            self.0.alias.fetch_add(1, Ordering::SeqCst);
            StandardAliases::new().alias(name)
        }

        fn use_system_codec(&self, canonical: &str) -> bool {
            StandardAliases::new().use_system_codec(canonical)
        }
    }

    struct CountingSystem(Arc<Calls>);

    impl SystemCodec for CountingSystem {
        fn construct(&self, canonical: &str) -> Result<Box<dyn Converter>> {
            self.0.system.fetch_add(1, Ordering::SeqCst);
            EncodingRsCodec.construct(canonical)
        }
    }

    struct CountingStore(Arc<Calls>, MemoryStore);

    impl ResourceStore for CountingStore {
        fn open(&self, path: &str) -> std::io::Result<Option<Vec<u8>>> {
            self.0.store.fetch_add(1, Ordering::SeqCst);
            self.1.open(path)
        }
    }

    /// Always reports a transient failure.
    struct BrokenSystem;

    impl SystemCodec for BrokenSystem {
        fn construct(&self, canonical: &str) -> Result<Box<dyn Converter>> {
            Err(Error::Construction {
                encoding: canonical.to_owned(),
                reason: "codec library not loaded".to_owned(),
            })
        }
    }

    fn counting_registry(store: MemoryStore) -> (Registry, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let registry = Registry::builder()
            .aliases(CountingAliases(calls.clone()))
            .system_codec(CountingSystem(calls.clone()))
            .store(CountingStore(calls.clone(), store))
            .build();
        (registry, calls)
    }

    fn latin9() -> PersistedConverter {
        let mut table: Vec<Option<char>> = (0u8..=255).map(|b| Some(b as char)).collect();
        table[0xA4] = Some('\u{20AC}');
        PersistedConverter::new("8859_15", table)
    }

    fn encode(conv: &mut dyn Converter, text: &str) -> Vec<u8> {
        let input: Vec<u16> = text.encode_utf16().collect();
        let mut out = vec![0u8; conv.number_of_bytes(&input)];
        let mut n = conv.convert(&input, &mut out).unwrap();
        n += conv.flush(&mut out[n..]).unwrap();
        out.truncate(n);
        out
    }

    #[test]
    fn test_builtin_resolution_via_alias() {
        let registry = Registry::default();
        let (mut conv, tier) = registry.resolve_with_tier("utf-8").unwrap();
        assert_eq!(tier, Tier::Builtin);
        assert_eq!(conv.encoding(), "UTF8");
        assert_eq!(encode(conv.as_mut(), "\u{E9}"), [0xC3, 0xA9]);
    }

    #[test]
    fn test_each_resolve_returns_independent_instance() {
        let registry = Registry::default();
        let mut a = registry.resolve("UTF8").unwrap();
        let b = registry.resolve("UTF8").unwrap();
        a.carry(&[0xD83D]);
        assert_eq!(a.pending(), 1);
        assert_eq!(b.pending(), 0);
    }

    #[test]
    fn test_unsupported_is_cached() {
        let (registry, calls) = counting_registry(MemoryStore::new());

        let err = registry.resolve("x-klingon").unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding(ref n) if n == "x-klingon"));
        let alias_calls = Calls::get(&calls.alias);
        let system_calls = Calls::get(&calls.system);
        let store_calls = Calls::get(&calls.store);
        assert_eq!(system_calls, 1);
        assert_eq!(store_calls, 1);

        for _ in 0..3 {
            assert!(matches!(
                registry.resolve("x-klingon"),
                Err(Error::UnsupportedEncoding(_))
            ));
        }
        assert_eq!(Calls::get(&calls.alias), alias_calls);
        assert_eq!(Calls::get(&calls.system), system_calls);
        assert_eq!(Calls::get(&calls.store), store_calls);
    }

    #[test]
    fn test_cached_hits_skip_alias_lookup() {
        let (registry, calls) = counting_registry(MemoryStore::new());

        for name in ["utf-8", "windows-1252"] {
            registry.resolve(name).unwrap();
        }
        assert_eq!(Calls::get(&calls.alias), 2);

        for _ in 0..5 {
            assert_eq!(registry.resolve("utf-8").unwrap().encoding(), "UTF8");
            assert_eq!(registry.resolve("windows-1252").unwrap().encoding(), "Cp1252");
        }
        assert_eq!(Calls::get(&calls.alias), 2);
    }

    #[test]
    fn test_cache_keyed_by_requested_name() {
        let (registry, calls) = counting_registry(MemoryStore::new());
        registry.resolve("x-klingon").unwrap_err();
        registry.resolve("X-KLINGON").unwrap_err();
        assert_eq!(Calls::get(&calls.system), 2);
        assert_eq!(registry.cached_names(), 2);
    }

    #[test]
    fn test_persisted_before_system_codec() {
        let mut store = MemoryStore::new();
        store.insert_converter(&latin9()).unwrap();
        let (registry, calls) = counting_registry(store);

        // ISO-8859-15 is also known to encoding_rs; the store must win.
        let (mut conv, tier) = registry.resolve_with_tier("latin9").unwrap();
        assert_eq!(tier, Tier::Persisted);
        assert_eq!(conv.encoding(), "8859_15");
        assert_eq!(encode(conv.as_mut(), "\u{20AC}"), [0xA4]);
        assert_eq!(Calls::get(&calls.system), 0);

        // Persisted objects are not cached; the store is consulted again.
        registry.resolve("latin9").unwrap();
        assert_eq!(Calls::get(&calls.store), 2);
        assert_eq!(registry.cached_names(), 0);
    }

    #[test]
    fn test_system_codec_last_resort_is_cached() {
        let (registry, calls) = counting_registry(MemoryStore::new());

        let (mut conv, tier) = registry.resolve_with_tier("windows-1252").unwrap();
        assert_eq!(tier, Tier::SystemCodec);
        assert_eq!(encode(conv.as_mut(), "\u{20AC}"), [0x80]);
        assert_eq!(Calls::get(&calls.store), 1);

        let (_, tier) = registry.resolve_with_tier("windows-1252").unwrap();
        assert_eq!(tier, Tier::SystemCodec);
        assert_eq!(Calls::get(&calls.store), 1);
        assert_eq!(Calls::get(&calls.system), 2);
    }

    #[test]
    fn test_marked_names_skip_builtins_and_store() {
        let (registry, calls) = counting_registry(MemoryStore::new());
        let (conv, tier) = registry.resolve_with_tier("Shift_JIS").unwrap();
        assert_eq!(tier, Tier::SystemCodec);
        assert_eq!(conv.encoding(), "SJIS");
        assert_eq!(Calls::get(&calls.store), 0);
    }

    #[test]
    fn test_malformed_persisted_falls_through() {
        let mut store = MemoryStore::new();
        store.insert(store::resource_path("Cp1252"), b"garbage".to_vec());
        let registry = Registry::builder().store(store).build();

        let (_, tier) = registry.resolve_with_tier("cp1252").unwrap();
        assert_eq!(tier, Tier::SystemCodec);
    }

    #[test]
    fn test_failing_factory_falls_back_to_system_codec() {
        let registry = Registry::builder()
            .register("Cp1252", || {
                Err(Error::Construction {
                    encoding: "Cp1252".to_owned(),
                    reason: "table missing".to_owned(),
                })
            })
            .build();

        let (mut conv, tier) = registry.resolve_with_tier("cp1252").unwrap();
        assert_eq!(tier, Tier::SystemCodec);
        assert_eq!(encode(conv.as_mut(), "\u{2122}"), [0x99]);
    }

    #[test]
    fn test_registered_factory_overrides_system_codec() {
        let registry = Registry::builder()
            .register("Cp1252", || {
                let conv: Box<dyn Converter> = Box::new(CharToByte::new("Cp1252", Latin1));
                Ok(conv)
            })
            .build();
        let (_, tier) = registry.resolve_with_tier("windows-1252").unwrap();
        assert_eq!(tier, Tier::Builtin);
    }

    #[test]
    fn test_transient_system_failure_is_not_cached_as_unsupported() {
        let registry = Registry::builder().system_codec(BrokenSystem).build();
        assert!(registry.resolve("EUC-JP").is_err());
        assert!(registry.resolve("EUC-JP").is_err());
        assert!(registry.system_converter("EUC_JP").is_none());
        assert_eq!(registry.cached_names(), 1);
    }

    #[test]
    fn test_get_default_resolves_configured_name() {
        let registry = Registry::builder().default_encoding("utf-8").build();
        assert_eq!(registry.default_encoding(), "utf-8");
        assert_eq!(registry.get_default().encoding(), "UTF8");
    }

    #[test]
    fn test_get_default_never_fails() {
        let registry = Registry::builder()
            .default_encoding("x-nothing-serves-this")
            .build();
        let mut conv = registry.get_default();
        assert_eq!(conv.encoding(), "Default");
        assert_eq!(encode(conv.as_mut(), "ok\u{E9}"), [b'o', b'k', 0xE9]);
        assert!(registry.resolve("x-nothing-serves-this").is_err());
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            default_encoding: "UTF-16BE".to_owned(),
            resource_dir: None,
        };
        let registry = Registry::from_config(&config);
        assert_eq!(registry.get_default().encoding(), "UnicodeBigUnmarked");
        assert!(registry.builtin_names().contains(&"8859_1"));
    }

    #[test]
    fn test_split_surrogate_end_to_end() {
        let registry = Registry::default();
        let text = "snow \u{2603} face \u{1F600}!";
        let input: Vec<u16> = text.encode_utf16().collect();
        let split_at = input.iter().position(|&u| u == 0xD83D).unwrap() + 1;

        for name in ["UTF-8", "UTF-16LE", "GB18030"] {
            let mut whole = registry.resolve(name).unwrap();
            let expected = encode(whole.as_mut(), text);

            let mut conv = registry.resolve(name).unwrap();
            let mut out = vec![0u8; 64];
            let mut n = conv.convert(&input[..split_at], &mut out).unwrap();
            assert_eq!(conv.pending(), 1, "{name}");
            n += conv.convert(&input[split_at..], &mut out[n..]).unwrap();
            n += conv.flush(&mut out[n..]).unwrap();
            assert_eq!(&out[..n], expected.as_slice(), "{name}");
        }
    }

    #[test]
    fn test_concurrent_resolution() {
        let registry = Arc::new(Registry::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let name = ["utf-8", "cp1252", "x-unknown", "euc-kr"][i % 4];
                    (0..50)
                        .map(|_| registry.resolve(name).map(|c| c.encoding().to_owned()).ok())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let results = handle.join().unwrap();
            let expected = match i % 4 {
                0 => Some("UTF8"),
                1 => Some("Cp1252"),
                2 => None,
                _ => Some("EUC_KR"),
            };
            assert!(results.iter().all(|r| r.as_deref() == expected));
        }
        assert_eq!(registry.cached_names(), 4);
    }
}
