use serde::Serialize;
use sysinfo::System;

use crate::config::Config;

#[derive(Serialize, Debug)]
pub struct SystemInfo {
    pub version: String,
    pub platform: String,
    pub arch: String,
    pub cpus: usize,
    pub cpu_model: String,
    pub memory_total_gb: f64,
    pub memory_free_gb: f64,
}

pub fn get_system_info() -> SystemInfo {
    let mut system = System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let memory_total = system.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0;
    let memory_free = system.available_memory() as f64 / 1024.0 / 1024.0 / 1024.0;

    let cpu_model = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    SystemInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpus: system.cpus().len(),
        cpu_model,
        memory_total_gb: memory_total,
        memory_free_gb: memory_free,
    }
}

pub fn print_startup_info(config: &Config) {
    let sys_info = get_system_info();

    println!("{}", "=".repeat(60));
    println!("🎥 Video Insights {} Starting...", sys_info.version);
    println!("{}", "=".repeat(60));
    println!("📊 System Information:");
    println!("  Platform: {} ({})", sys_info.platform, sys_info.arch);
    println!("  CPUs: {} ({})", sys_info.cpus, sys_info.cpu_model);
    println!(
        "  Memory: {:.2} GB total, {:.2} GB available",
        sys_info.memory_total_gb, sys_info.memory_free_gb
    );
    println!("🤖 Model:");
    println!("  Model: {}", config.model.model);
    println!(
        "  API key: {}",
        if config.model.api_key.is_some() {
            "configured"
        } else {
            "MISSING (set GOOGLE_API_KEY; analyses will fail)"
        }
    );
    println!(
        "  Web search: {}",
        if config.search.enabled {
            config.search.base_url.as_str()
        } else {
            "disabled"
        }
    );
    println!("  Prompt style: {:?}", config.model.prompt_style);
    println!(
        "  Poll: every {}ms, give up after {}s",
        config.poll.interval.as_millis(),
        config.poll.timeout.as_secs()
    );
    println!("  Scratch Dir: {:?}", config.scratch_dir);
    println!("  Static Dir: {:?}", config.static_dir);
    println!("{}", "=".repeat(60));
}
