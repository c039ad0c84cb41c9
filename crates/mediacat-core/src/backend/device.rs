//! Attached devices (phones, cameras) reached over a slow transport.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::PathBuf;

use tracing::{debug, info};

use super::local::stat_from_metadata;
use super::{BoxRead, Enumeration, FileStat, StorageBackend};
use crate::date::YearMonth;
use crate::error::BackendError;

/// Low-level access to a device's object tree.
///
/// `files` returns metadata together with identifiers so that a single round
/// trip covers both listing and stat.
pub trait DeviceTransport {
    fn name(&self) -> &str;
    fn connect(&mut self) -> Result<(), BackendError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn directories(&self, path: &str) -> Result<Vec<String>, BackendError>;
    fn is_hidden(&self, path: &str) -> Result<bool, BackendError>;
    /// Files under `path` whose name starts with `prefix`; an empty prefix
    /// matches everything.
    fn files(&self, path: &str, prefix: &str) -> Result<Vec<(String, FileStat)>, BackendError>;
    fn file_info(&self, path: &str) -> Result<FileStat, BackendError>;
    fn read(&self, path: &str) -> Result<BoxRead<'_>, BackendError>;
}

/// Backend over an attached device.
///
/// Owns the device session: connects on construction and disconnects when
/// dropped, so the connection is released however the crawl ends.
pub struct DeviceBackend<T: DeviceTransport> {
    transport: T,
    known: RefCell<HashMap<String, FileStat>>,
}

impl<T: DeviceTransport> DeviceBackend<T> {
    pub fn new(mut transport: T) -> Result<Self, BackendError> {
        if !transport.is_connected() {
            transport.connect()?;
        }
        info!(device = transport.name(), "device session opened");
        Ok(Self {
            transport,
            known: RefCell::new(HashMap::new()),
        })
    }

    fn ensure_connected(&self) -> Result<(), BackendError> {
        if self.transport.is_connected() {
            Ok(())
        } else {
            Err(BackendError::unavailable(self.transport.name(), "device disconnected"))
        }
    }
}

impl<T: DeviceTransport> Drop for DeviceBackend<T> {
    fn drop(&mut self) {
        self.transport.disconnect();
        info!(device = self.transport.name(), "device session closed");
    }
}

impl<T: DeviceTransport> StorageBackend for DeviceBackend<T> {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn enumeration(&self) -> Enumeration {
        Enumeration::Hinted
    }

    fn list_directories(&self, path: &str) -> Result<Vec<String>, BackendError> {
        self.ensure_connected()?;
        self.transport.directories(path)
    }

    fn is_hidden(&self, path: &str) -> Result<bool, BackendError> {
        self.ensure_connected()?;
        self.transport.is_hidden(path)
    }

    fn list_files(&self, path: &str, hint: Option<YearMonth>) -> Result<Vec<String>, BackendError> {
        self.ensure_connected()?;
        let prefix = hint.map(|h| h.prefix()).unwrap_or_default();
        debug!(directory = path, prefix = %prefix, "loading files");

        let entries = self.transport.files(path, &prefix)?;
        let mut known = self.known.borrow_mut();
        let mut ids = Vec::with_capacity(entries.len());
        for (id, stat) in entries {
            known.insert(id.clone(), stat);
            ids.push(id);
        }
        Ok(ids)
    }

    fn stat_file(&self, id: &str) -> Result<FileStat, BackendError> {
        if let Some(stat) = self.known.borrow().get(id) {
            return Ok(stat.clone());
        }
        self.ensure_connected()?;
        let stat = self.transport.file_info(id)?;
        self.known.borrow_mut().insert(id.to_string(), stat.clone());
        Ok(stat)
    }

    fn open(&self, id: &str) -> Result<BoxRead<'_>, BackendError> {
        self.ensure_connected()?;
        self.transport.read(id)
    }
}

/// A device exposed through a mount point, e.g. an MTP phone mounted by
/// gvfs or jmtpfs. Identifiers are full paths under the mount.
///
/// A mount point that disappears is reported as a disconnected device.
pub struct MountedDevice {
    name: String,
    mount: PathBuf,
    connected: bool,
}

impl MountedDevice {
    pub fn new(name: impl Into<String>, mount: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mount: mount.into(),
            connected: false,
        }
    }

    pub fn mount(&self) -> &std::path::Path {
        &self.mount
    }

    fn io_error(&self, path: &str, source: io::Error) -> BackendError {
        if self.mount.is_dir() {
            BackendError::io(path, source)
        } else {
            BackendError::unavailable(&self.name, format!("{} is no longer mounted", self.mount.display()))
        }
    }
}

impl DeviceTransport for MountedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<(), BackendError> {
        if !self.mount.is_dir() {
            return Err(BackendError::unavailable(
                &self.name,
                format!("mount point {} not found", self.mount.display()),
            ));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected && self.mount.is_dir()
    }

    fn directories(&self, path: &str) -> Result<Vec<String>, BackendError> {
        let entries = fs::read_dir(path).map_err(|e| self.io_error(path, e))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_error(path, e))?;
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                out.push(entry.path().to_string_lossy().into_owned());
            }
        }
        Ok(out)
    }

    fn is_hidden(&self, path: &str) -> Result<bool, BackendError> {
        Ok(super::file_name_of(path).starts_with('.'))
    }

    fn files(&self, path: &str, prefix: &str) -> Result<Vec<(String, FileStat)>, BackendError> {
        let entries = fs::read_dir(path).map_err(|e| self.io_error(path, e))?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_error(path, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if meta.is_file() {
                let id = entry.path().to_string_lossy().into_owned();
                out.push((id, stat_from_metadata(name, &meta)));
            }
        }
        Ok(out)
    }

    fn file_info(&self, path: &str) -> Result<FileStat, BackendError> {
        let meta = fs::metadata(path).map_err(|e| self.io_error(path, e))?;
        Ok(stat_from_metadata(super::file_name_of(path).to_string(), &meta))
    }

    fn read(&self, path: &str) -> Result<BoxRead<'_>, BackendError> {
        let file = File::open(path).map_err(|e| self.io_error(path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::io::Write;
    use std::rc::Rc;
    use tempfile::tempdir;

    /// Call log shared between a scripted transport and the test body.
    #[derive(Default)]
    pub(crate) struct TransportLog {
        pub connected: Cell<bool>,
        pub unplugged: Cell<bool>,
        pub disconnects: Cell<u32>,
        pub file_info_calls: Cell<u32>,
        pub prefixes: RefCell<Vec<String>>,
    }

    /// Device with a flat `/DCIM` folder of files.
    pub(crate) struct ScriptedTransport {
        pub log: Rc<TransportLog>,
        pub files: Vec<(String, u64)>,
    }

    impl ScriptedTransport {
        fn stat(name: &str, size: u64) -> FileStat {
            FileStat {
                name: name.to_string(),
                size,
                last_write_time: None,
                creation_time: None,
            }
        }
    }

    impl DeviceTransport for ScriptedTransport {
        fn name(&self) -> &str {
            "phone"
        }
        fn connect(&mut self) -> Result<(), BackendError> {
            if self.log.unplugged.get() {
                return Err(BackendError::unavailable("phone", "not attached"));
            }
            self.log.connected.set(true);
            Ok(())
        }
        fn disconnect(&mut self) {
            self.log.connected.set(false);
            self.log.disconnects.set(self.log.disconnects.get() + 1);
        }
        fn is_connected(&self) -> bool {
            self.log.connected.get() && !self.log.unplugged.get()
        }
        fn directories(&self, path: &str) -> Result<Vec<String>, BackendError> {
            Ok(if path == "/" { vec!["/DCIM".to_string()] } else { vec![] })
        }
        fn is_hidden(&self, _path: &str) -> Result<bool, BackendError> {
            Ok(false)
        }
        fn files(&self, path: &str, prefix: &str) -> Result<Vec<(String, FileStat)>, BackendError> {
            self.log.prefixes.borrow_mut().push(prefix.to_string());
            if path != "/DCIM" {
                return Ok(vec![]);
            }
            Ok(self
                .files
                .iter()
                .filter(|(name, _)| name.starts_with(prefix))
                .map(|(name, size)| (format!("/DCIM/{}", name), Self::stat(name, *size)))
                .collect())
        }
        fn file_info(&self, path: &str) -> Result<FileStat, BackendError> {
            self.log.file_info_calls.set(self.log.file_info_calls.get() + 1);
            let name = crate::backend::file_name_of(path);
            self.files
                .iter()
                .find(|(n, _)| n == name)
                .map(|(n, size)| Self::stat(n, *size))
                .ok_or_else(|| BackendError::io(path, io::Error::from(io::ErrorKind::NotFound)))
        }
        fn read(&self, _path: &str) -> Result<BoxRead<'_>, BackendError> {
            Ok(Box::new(io::empty()))
        }
    }

    pub(crate) fn scripted(files: &[(&str, u64)]) -> (ScriptedTransport, Rc<TransportLog>) {
        let log = Rc::new(TransportLog::default());
        let transport = ScriptedTransport {
            log: Rc::clone(&log),
            files: files.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
        };
        (transport, log)
    }

    #[test]
    fn test_hinted_listing_uses_month_prefix() {
        let (transport, log) = scripted(&[("20200101_120000.mp4", 10), ("20200201_120000.mp4", 20)]);
        let backend = DeviceBackend::new(transport).unwrap();
        assert_eq!(backend.enumeration(), Enumeration::Hinted);

        let jan = backend.list_files("/DCIM", Some(YearMonth { year: 2020, month: 1 })).unwrap();
        assert_eq!(jan, vec!["/DCIM/20200101_120000.mp4".to_string()]);

        let all = backend.list_files("/DCIM", None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(*log.prefixes.borrow(), vec!["202001".to_string(), String::new()]);
    }

    #[test]
    fn test_stat_served_from_listing_cache() {
        let (transport, log) = scripted(&[("20200101_120000.mp4", 10)]);
        let backend = DeviceBackend::new(transport).unwrap();
        backend.list_files("/DCIM", None).unwrap();

        let first = backend.stat_file("/DCIM/20200101_120000.mp4").unwrap();
        let second = backend.stat_file("/DCIM/20200101_120000.mp4").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.size, 10);
        assert_eq!(log.file_info_calls.get(), 0);
    }

    #[test]
    fn test_stat_without_listing_goes_to_device() {
        let (transport, log) = scripted(&[("a.mp4", 3)]);
        let backend = DeviceBackend::new(transport).unwrap();
        assert_eq!(backend.stat_file("/DCIM/a.mp4").unwrap().size, 3);
        backend.stat_file("/DCIM/a.mp4").unwrap();
        assert_eq!(log.file_info_calls.get(), 1);
    }

    #[test]
    fn test_session_released_on_drop() {
        let (transport, log) = scripted(&[]);
        {
            let backend = DeviceBackend::new(transport).unwrap();
            assert!(log.connected.get());
            backend.list_directories("/").unwrap();
        }
        assert!(!log.connected.get());
        assert_eq!(log.disconnects.get(), 1);
    }

    #[test]
    fn test_unplugged_device_is_unavailable() {
        let (transport, log) = scripted(&[("a.mp4", 3)]);
        let backend = DeviceBackend::new(transport).unwrap();
        log.unplugged.set(true);
        let err = backend.list_directories("/").unwrap_err();
        assert!(err.is_unavailable());

        let (transport, log) = scripted(&[]);
        log.unplugged.set(true);
        assert!(DeviceBackend::new(transport).err().unwrap().is_unavailable());
    }

    #[test]
    fn test_mounted_device_filters_by_prefix() {
        let dir = tempdir().unwrap();
        let dcim = dir.path().join("DCIM");
        fs::create_dir(&dcim).unwrap();
        File::create(dcim.join("20200105_101010.mp4")).unwrap().write_all(b"x").unwrap();
        File::create(dcim.join("20200301_101010.mp4")).unwrap().write_all(b"yy").unwrap();
        fs::create_dir(dcim.join(".trash")).unwrap();

        let backend = DeviceBackend::new(MountedDevice::new("phone", dir.path())).unwrap();
        let dcim_id = dcim.to_string_lossy().into_owned();
        let jan = backend.list_files(&dcim_id, Some(YearMonth { year: 2020, month: 1 })).unwrap();
        assert_eq!(jan.len(), 1);
        assert_eq!(backend.stat_file(&jan[0]).unwrap().size, 1);

        let dirs = backend.list_directories(&dcim_id).unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(backend.is_hidden(&dirs[0]).unwrap());
    }

    #[test]
    fn test_mounted_device_missing_mount() {
        let dir = tempdir().unwrap();
        let err = DeviceBackend::new(MountedDevice::new("phone", dir.path().join("absent")))
            .err()
            .unwrap();
        assert!(err.is_unavailable());
    }
}
