//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`].
//!
//! - Config: one postcard blob under `powerctl::syscfg`, validated before
//!   every save.
//! - Rules and tags: postcard blobs written by
//!   [`rules::record`](crate::rules::record), one namespace per owner
//!   (`unit`, `mod1`, `mod2`, ...).
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//!
//! On the host a `HashMap` simulation backend stands in for flash.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::SystemConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "powerctl";
const CONFIG_KEY: &str = "syscfg";

/// NVS caps namespace and key names at 15 characters.
const NVS_NAME_MAX: usize = 15;

const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    /// Reject names NVS would silently truncate.
    fn check_name(name: &str) -> Result<(), StorageError> {
        if name.is_empty() || name.len() > NVS_NAME_MAX {
            warn!("NvsAdapter: invalid name '{}'", name);
            return Err(StorageError::IoError);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of an NVS name.
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; NVS_NAME_MAX + 1] {
        let mut buf = [0u8; NVS_NAME_MAX + 1];
        let len = name.len().min(NVS_NAME_MAX);
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe { nvs_close(handle) };
        result
    }

    #[cfg(target_os = "espidf")]
    fn get_blob(namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let k = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, false, |handle| {
            let mut size = buf.len();
            let ret = unsafe {
                nvs_get_blob(handle, k.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
            };
            if ret == ESP_OK { Ok(size) } else { Err(ret) }
        });
        match result {
            Ok(size) => Ok(size),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
            Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::Corrupted),
            Err(_) => Err(StorageError::IoError),
        }
    }

    #[cfg(target_os = "espidf")]
    fn set_blob(namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let k = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, true, |handle| {
            let ret = unsafe {
                nvs_set_blob(handle, k.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret == ESP_OK { Ok(()) } else { Err(ret) }
        });
        result.map_err(|e| {
            warn!("NvsAdapter: write {}::{} failed ({})", namespace, key, e);
            if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                StorageError::Full
            } else {
                StorageError::IoError
            }
        })
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = vec![0u8; MAX_BLOB_SIZE];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                cfg.validate()?;
                info!("NvsAdapter: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(StorageError::Corrupted) => Err(ConfigError::Corrupted),
            Err(e) => {
                warn!("NvsAdapter: config read error ({}), using defaults", e);
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        self.store
            .borrow_mut()
            .insert(Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY), bytes.clone());

        #[cfg(target_os = "espidf")]
        Self::set_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes).map_err(|e| match e {
            StorageError::Full => ConfigError::StorageFull,
            _ => ConfigError::IoError,
        })?;

        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        Self::check_name(namespace)?;
        Self::check_name(key)?;

        #[cfg(not(target_os = "espidf"))]
        {
            match self.store.borrow().get(&Self::composite_key(namespace, key)) {
                Some(data) if data.len() > buf.len() => Err(StorageError::Corrupted),
                Some(data) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            Self::get_blob(namespace, key, buf)
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        Self::check_name(namespace)?;
        Self::check_name(key)?;
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            Self::set_blob(namespace, key, data)
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        Self::check_name(namespace)?;
        Self::check_name(key)?;

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .remove(&Self::composite_key(namespace, key));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, k.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret == ESP_OK { Ok(()) } else { Err(ret) }
            });
            match result {
                Ok(()) => Ok(()),
                // Namespace never written: nothing to delete.
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(()),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        if Self::check_name(namespace).is_err() || Self::check_name(key).is_err() {
            return false;
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow()
                .contains_key(&Self::composite_key(namespace, key))
        }

        #[cfg(target_os = "espidf")]
        {
            let k = Self::c_name(key);
            Self::with_nvs_handle(namespace, false, |handle| {
                let ret =
                    unsafe { nvs_find_key(handle, k.as_ptr() as *const _, core::ptr::null_mut()) };
                Ok(ret == ESP_OK)
            })
            .unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_when_absent() {
        let nvs = NvsAdapter::new().unwrap();
        assert_eq!(nvs.load().unwrap(), SystemConfig::default());
    }

    #[test]
    fn config_save_load() {
        let nvs = NvsAdapter::new().unwrap();
        let cfg = SystemConfig {
            reason_interval_ms: 500,
            ..SystemConfig::default()
        };
        nvs.save(&cfg).unwrap();
        assert_eq!(nvs.load().unwrap(), cfg);
    }

    #[test]
    fn invalid_config_is_not_saved() {
        let nvs = NvsAdapter::new().unwrap();
        let cfg = SystemConfig {
            max_rules_per_engine: 0,
            ..SystemConfig::default()
        };
        assert!(matches!(nvs.save(&cfg), Err(ConfigError::ValidationFailed(_))));
        assert_eq!(nvs.load().unwrap(), SystemConfig::default());
    }

    #[test]
    fn corrupted_config_is_reported() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write(CONFIG_NAMESPACE, CONFIG_KEY, &[0xFF; 3]).unwrap();
        assert_eq!(nvs.load(), Err(ConfigError::Corrupted));
    }

    #[test]
    fn storage_round_trip() {
        let mut nvs = NvsAdapter::new().unwrap();
        let data = b"hello NVS";
        nvs.write("test_ns", "greeting", data).unwrap();
        assert!(nvs.exists("test_ns", "greeting"));

        let mut buf = [0u8; 64];
        let len = nvs.read("test_ns", "greeting", &mut buf).unwrap();
        assert_eq!(&buf[..len], data);

        nvs.delete("test_ns", "greeting").unwrap();
        assert!(!nvs.exists("test_ns", "greeting"));
    }

    #[test]
    fn storage_read_missing_key() {
        let nvs = NvsAdapter::new().unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(nvs.read("ns", "nope", &mut buf), Err(StorageError::NotFound));
    }

    #[test]
    fn oversized_and_misnamed_entries_rejected() {
        let mut nvs = NvsAdapter::new().unwrap();
        assert_eq!(
            nvs.write("unit", "rules", &vec![0u8; MAX_BLOB_SIZE + 1]),
            Err(StorageError::Full)
        );
        assert_eq!(
            nvs.write("a_namespace_too_long", "k", b"x"),
            Err(StorageError::IoError)
        );
        let mut small = [0u8; 2];
        nvs.write("unit", "tags", b"abcd").unwrap();
        assert_eq!(nvs.read("unit", "tags", &mut small), Err(StorageError::Corrupted));
    }

    #[test]
    fn namespace_isolation() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("mod1", "rules", b"alpha").unwrap();
        nvs.write("mod2", "rules", b"bravo").unwrap();

        let mut buf = [0u8; 64];
        let len = nvs.read("mod1", "rules", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"alpha");

        let len = nvs.read("mod2", "rules", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"bravo");
    }
}
