pub mod accrual;
pub mod config;
pub mod order;
pub mod reconciler;
pub mod testing;

pub use accrual::{
    AccrualConfig, AccrualError, AccrualService, AccrualStatus, ErrorClass, HttpAccrualClient,
    OrderAccrual, RateLimitGate,
};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, DatabaseConfig, LogFormat, LoggingConfig,
};
pub use order::{
    is_valid_order_number, Order, OrderError, OrderStatus, OrderStore, PendingOrder,
    SqliteOrderStore, StoreHealthCheck,
};
pub use reconciler::{
    AccrualReconciler, Job, JobResult, LifecyclePhase, ReconcilerConfig, ReconcilerError,
    ReconcilerHandle, ReconcilerStatus,
};
