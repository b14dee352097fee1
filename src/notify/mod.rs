//! 通知总线：把任务完成 / 挂起事件扇出给同一会话的所有在线监听者

pub mod bus;

pub use bus::{NotificationBus, Subscription};
