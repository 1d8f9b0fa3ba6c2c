mod announce;
mod config;
mod diff;
mod error;
mod events;
mod health;
mod journal;
mod notify;
mod payload;
mod protocol;
mod reconcile;
mod registry;
mod resolution;
mod semantics;
mod server;
mod sync;
mod validate;

pub use announce::{WelcomeAnnouncer, WELCOME_TIMEOUT};
pub use config::{DeviceConfigStore, DeviceEntry, JsonFileStore, MemoryStore};
pub use diff::diff_fields;
pub use error::{Error, Result};
pub use events::{BroadcastSink, BusEvent, EventSink, NullSink};
pub use health::{default_silence_threshold, run_health_check, silent_devices, SilenceAdvisory};
pub use journal::{IngestJournal, JournalMode};
pub use notify::{LogNotifier, Notifier};
pub use payload::Telemetry;
pub use protocol::{ConversionFactor, CounterName, CounterType};
pub use reconcile::{
    device_id_from_mac, device_name_from_mac, normalize_mac, IngestOutcome, Reconciler,
};
pub use registry::{DeviceRecord, DeviceRegistry};
pub use resolution::{resolve_option, ValueOrigin};
pub use semantics::{
    channel_visible, ChannelSemantics, DeviceClass, StateClass, UNIT_CUBIC_METERS, UNIT_GCAL,
    UNIT_KILOWATT_HOURS,
};
pub use server::{router, serve, AppState, Hub, MAX_JSON_SIZE};
pub use sync::{
    build_settings, settings_for_device, sync_status, DesiredSettings, DesiredStore,
    ParamDifference, PushGate, SyncParam, SyncReport, SyncStatus,
};
pub use validate::{clean, sanitize_in_place, validate, validate_strict};
