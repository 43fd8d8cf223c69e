use serde::Serialize;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// 当前服务进程的资源占用
#[derive(Debug, Clone, Serialize, Default)]
pub struct SelfStats {
    /// 常驻内存 (字节)
    pub memory_bytes: u64,
}

pub struct StatsCollector {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl StatsCollector {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            log::warn!("Unable to resolve own PID, process stats disabled");
        }
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }

    pub fn collect(&self) -> Option<SelfStats> {
        let pid = self.pid?;
        let mut sys = self.system.lock().ok()?;
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        let process = sys.process(pid)?;
        Some(SelfStats {
            memory_bytes: process.memory(),
        })
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
