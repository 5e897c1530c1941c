//! In-memory loopback transport
//!
//! `LoopbackTransport` emulates a device entirely in memory: reads return a
//! stored snapshot, writes mutate it. Failure injection (failing reads,
//! per-target write failures) and connect/disconnect toggling make it the
//! backend of choice for engine tests and offline development.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::TransportError;
use crate::types::{DeviceInfo, DeviceSnapshot, Keycode, LinkEvent, RgbColor};
use crate::Transport;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Record of one write accepted by the loopback device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Key {
        layer: u8,
        row: u8,
        col: u8,
        keycode: Keycode,
    },
    LayerName {
        layer: u8,
        name: String,
    },
    LayerColor {
        layer: u8,
        color: RgbColor,
    },
    Setting {
        name: String,
        value: i32,
    },
}

struct LoopbackState {
    snapshot: DeviceSnapshot,
    connected: bool,
    failing_reads: u32,
    failing_key_writes: BTreeMap<(u8, u8, u8), u32>,
    failing_setting_writes: BTreeMap<String, u32>,
    write_log: Vec<WriteOp>,
}

/// Emulated device holding its configuration in memory.
pub struct LoopbackTransport {
    info: DeviceInfo,
    state: Mutex<LoopbackState>,
    events: broadcast::Sender<LinkEvent>,
}

impl LoopbackTransport {
    /// Create a loopback device seeded with the given configuration.
    pub fn new(snapshot: DeviceSnapshot) -> Self {
        let info = DeviceInfo {
            vid: 0x1209,
            pid: 0x4C4D,
            product_name: Some("Loopback".into()),
            serial: None,
            rows: snapshot.rows(),
            cols: snapshot.cols(),
            layers: snapshot.layer_count(),
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            info,
            state: Mutex::new(LoopbackState {
                snapshot,
                connected: true,
                failing_reads: 0,
                failing_key_writes: BTreeMap::new(),
                failing_setting_writes: BTreeMap::new(),
                write_log: Vec::new(),
            }),
            events,
        }
    }

    /// Create a loopback device with an all-unbound matrix.
    pub fn blank(layers: u8, rows: u8, cols: u8) -> Self {
        Self::new(DeviceSnapshot::blank(layers, rows, cols))
    }

    /// Replace the emulated configuration out-of-band, as if the device had
    /// been reflashed elsewhere.
    pub fn flash(&self, snapshot: DeviceSnapshot) {
        self.state.lock().snapshot = snapshot;
    }

    /// The configuration the emulated device currently holds.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.state.lock().snapshot.clone()
    }

    /// Plug or unplug the emulated device. Publishes a link event.
    pub fn set_connected(&self, connected: bool) {
        let mut s = self.state.lock();
        if s.connected == connected {
            return;
        }
        s.connected = connected;
        drop(s);

        let event = if connected {
            LinkEvent::Connected
        } else {
            LinkEvent::Disconnected
        };
        let _ = self.events.send(event);
    }

    /// Make the next `count` state reads fail with a timeout.
    pub fn fail_next_reads(&self, count: u32) {
        self.state.lock().failing_reads = count;
    }

    /// Make the next `count` writes to one keymap cell fail.
    pub fn fail_key_writes(&self, layer: u8, row: u8, col: u8, count: u32) {
        self.state
            .lock()
            .failing_key_writes
            .insert((layer, row, col), count);
    }

    /// Make the next `count` writes to one setting fail.
    pub fn fail_setting_writes(&self, name: &str, count: u32) {
        self.state
            .lock()
            .failing_setting_writes
            .insert(name.to_string(), count);
    }

    /// Writes accepted so far, in order.
    pub fn write_log(&self) -> Vec<WriteOp> {
        self.state.lock().write_log.clone()
    }

    pub fn clear_write_log(&self) {
        self.state.lock().write_log.clear();
    }
}

fn take_injected_failure(counter: Option<&mut u32>) -> bool {
    match counter {
        Some(n) if *n > 0 => {
            *n -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn read_state(&self) -> Result<DeviceSnapshot, TransportError> {
        let mut s = self.state.lock();
        if !s.connected {
            return Err(TransportError::Disconnected);
        }
        if s.failing_reads > 0 {
            s.failing_reads -= 1;
            return Err(TransportError::Timeout);
        }
        Ok(s.snapshot.clone())
    }

    async fn write_key(
        &self,
        layer: u8,
        row: u8,
        col: u8,
        keycode: Keycode,
    ) -> Result<(), TransportError> {
        let mut s = self.state.lock();
        if !s.connected {
            return Err(TransportError::Disconnected);
        }
        if take_injected_failure(s.failing_key_writes.get_mut(&(layer, row, col))) {
            return Err(TransportError::WriteRejected {
                target: format!("key {layer}/{row}/{col}"),
                reason: "injected failure".into(),
            });
        }

        let cell = s
            .snapshot
            .layers
            .get_mut(layer as usize)
            .and_then(|l| l.keys.get_mut(row as usize))
            .and_then(|r| r.get_mut(col as usize));
        match cell {
            Some(cell) => {
                *cell = keycode;
                s.write_log.push(WriteOp::Key {
                    layer,
                    row,
                    col,
                    keycode,
                });
                debug!("Loopback key write {layer}/{row}/{col} = {keycode}");
                Ok(())
            }
            None => Err(TransportError::WriteRejected {
                target: format!("key {layer}/{row}/{col}"),
                reason: "outside the matrix".into(),
            }),
        }
    }

    async fn write_layer_name(&self, layer: u8, name: &str) -> Result<(), TransportError> {
        let mut s = self.state.lock();
        if !s.connected {
            return Err(TransportError::Disconnected);
        }
        match s.snapshot.layers.get_mut(layer as usize) {
            Some(l) => {
                l.name = name.to_string();
                s.write_log.push(WriteOp::LayerName {
                    layer,
                    name: name.to_string(),
                });
                Ok(())
            }
            None => Err(TransportError::WriteRejected {
                target: format!("layer {layer} name"),
                reason: "no such layer".into(),
            }),
        }
    }

    async fn write_layer_color(&self, layer: u8, color: RgbColor) -> Result<(), TransportError> {
        let mut s = self.state.lock();
        if !s.connected {
            return Err(TransportError::Disconnected);
        }
        match s.snapshot.layers.get_mut(layer as usize) {
            Some(l) => {
                l.color = color;
                s.write_log.push(WriteOp::LayerColor { layer, color });
                Ok(())
            }
            None => Err(TransportError::WriteRejected {
                target: format!("layer {layer} color"),
                reason: "no such layer".into(),
            }),
        }
    }

    async fn read_setting(&self, name: &str) -> Result<i32, TransportError> {
        let s = self.state.lock();
        if !s.connected {
            return Err(TransportError::Disconnected);
        }
        s.snapshot
            .settings
            .get(name)
            .copied()
            .ok_or_else(|| TransportError::UnknownSetting(name.to_string()))
    }

    async fn write_setting(&self, name: &str, value: i32) -> Result<(), TransportError> {
        let mut s = self.state.lock();
        if !s.connected {
            return Err(TransportError::Disconnected);
        }
        if take_injected_failure(s.failing_setting_writes.get_mut(name)) {
            return Err(TransportError::WriteRejected {
                target: format!("setting '{name}'"),
                reason: "injected failure".into(),
            });
        }
        if !s.snapshot.settings.contains_key(name) {
            return Err(TransportError::UnknownSetting(name.to_string()));
        }
        s.snapshot.settings.insert(name.to_string(), value);
        s.write_log.push(WriteOp::Setting {
            name: name.to_string(),
            value,
        });
        debug!("Loopback setting write '{name}' = {value}");
        Ok(())
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.set_connected(false);
        Ok(())
    }

    fn subscribe_events(&self) -> Option<broadcast::Receiver<LinkEvent>> {
        Some(self.events.subscribe())
    }
}
