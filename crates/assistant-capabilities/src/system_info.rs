//! System Info Capability
//!
//! Reports basic facts about the host the assistant runs on.

use async_trait::async_trait;
use serde_json::json;
use sysinfo::System;

use assistant_core::{AssistantError, Capability, CapabilityContext, CapabilityResult, Result as CoreResult};

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Snapshot of host facts
#[derive(Debug, Clone, PartialEq, Eq)]
struct HostSnapshot {
    os: String,
    os_version: String,
    kernel: String,
    host_name: String,
    cpu_count: usize,
    total_memory_mib: u64,
    used_memory_mib: u64,
}

impl HostSnapshot {
    fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();

        let unknown = || "unknown".to_string();
        Self {
            os: System::name().unwrap_or_else(unknown),
            os_version: System::os_version().unwrap_or_else(unknown),
            kernel: System::kernel_version().unwrap_or_else(unknown),
            host_name: System::host_name().unwrap_or_else(unknown),
            cpu_count: sys.cpus().len(),
            total_memory_mib: sys.total_memory() / BYTES_PER_MIB,
            used_memory_mib: sys.used_memory() / BYTES_PER_MIB,
        }
    }

    fn render(&self) -> String {
        let mut output = String::from("System Information\n");
        output.push_str(&format!("  OS:       {} {}\n", self.os, self.os_version));
        output.push_str(&format!("  Kernel:   {}\n", self.kernel));
        output.push_str(&format!("  Host:     {}\n", self.host_name));
        output.push_str(&format!("  CPUs:     {}\n", self.cpu_count));
        output.push_str(&format!(
            "  Memory:   {} MiB used / {} MiB total",
            self.used_memory_mib, self.total_memory_mib
        ));
        output
    }
}

/// Reports OS, kernel, host name, CPU count and memory
#[derive(Debug, Default)]
pub struct SystemInfoCapability;

impl SystemInfoCapability {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Capability for SystemInfoCapability {
    fn name(&self) -> &str {
        "system_info"
    }

    fn description(&self) -> &str {
        "Reports information about the host system: operating system, kernel, host name, CPU count and memory usage."
    }

    async fn execute(&self, _context: CapabilityContext) -> CoreResult<CapabilityResult> {
        // sysinfo reads /proc and friends synchronously
        let snapshot = tokio::task::spawn_blocking(HostSnapshot::collect)
            .await
            .map_err(|e| AssistantError::CapabilityExecution(format!("system query failed: {e}")))?;

        let data = json!({
            "os": snapshot.os,
            "os_version": snapshot.os_version,
            "kernel": snapshot.kernel,
            "host_name": snapshot.host_name,
            "cpu_count": snapshot.cpu_count,
            "total_memory_mib": snapshot.total_memory_mib,
            "used_memory_mib": snapshot.used_memory_mib,
        });

        Ok(CapabilityResult::success_with_data(snapshot.render(), data))
    }
}
