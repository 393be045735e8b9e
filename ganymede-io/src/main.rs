use std::sync::Arc;

use ganymede::api::{ApiEndpoint, DEFAULT_API_GROUP};
use ganymede::builder::Builder;
use ganymede::config::Config;
use ganymede::groups::Groups;
use ganymede::platform::Platform;
use ganymede::pool::HttpPool;
use ganymede::server::Server;

/// Used if no groups are configured.
const DEFAULT_MAX_MEMORY: usize = 2 << 10;

/// Simulates a slow database which knows a few scores.
async fn load_score(key: String) -> anyhow::Result<Vec<u8>> {
    log::info!("[SlowDB] Searching key {}...", key);
    match key.as_str() {
        "Tom" => Ok(b"630".to_vec()),
        "Jack" => Ok(b"589".to_vec()),
        "Sam" => Ok(b"567".to_vec()),
        _ => Err(anyhow::anyhow!("{} not exist", key)),
    }
}

/// Reads **groups.<name>.max_memory** for all configured groups.
fn configured_groups(config: &Config) -> anyhow::Result<Vec<(String, usize)>> {
    let handle = config.current();
    let mut groups = Vec::new();

    if let Some(entries) = handle.query("groups").as_hash() {
        for (name, settings) in entries {
            let name = name
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Group names must be strings."))?;
            let max_memory = match &settings["max_memory"] {
                yaml_value if yaml_value.is_badvalue() => DEFAULT_MAX_MEMORY,
                yaml_value => match yaml_value.as_i64() {
                    Some(size) => usize::try_from(size)?,
                    None => ganymede::fmt::parse_size(yaml_value.as_str().unwrap_or_default())?,
                },
            };
            groups.push((name.to_owned(), max_memory));
        }
    }

    if groups.is_empty() {
        groups.push((DEFAULT_API_GROUP.to_owned(), DEFAULT_MAX_MEMORY));
    }

    Ok(groups)
}

/// Forks the front end for external clients if **api.enabled** is set.
fn start_api(platform: &Arc<Platform>, config: &Config, groups: Arc<Groups>) {
    let handle = config.current();
    if !handle.query("api.enabled").as_bool().unwrap_or(false) {
        return;
    }

    let group = handle
        .query("api.group")
        .as_str()
        .unwrap_or(DEFAULT_API_GROUP)
        .to_owned();
    let api = Server::new(platform, Arc::new(ApiEndpoint::new(groups, group)), "api", 9999);
    Server::fork(&api);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Build a platform and enable all features...
    let platform = Builder::new().enable_all().build().await;
    let config = platform.require::<Config>();
    let groups = platform.require::<Groups>();
    let pool = platform.require::<HttpPool>();

    // Create all groups, then announce the peers and attach them to each group...
    for (name, max_memory) in configured_groups(&config)? {
        let _ = groups.new_group(&name, max_memory, load_score)?;
    }
    pool.set(&ganymede::pool::configured_peers(&platform));
    for name in groups.names() {
        if let Some(group) = groups.get_group(&name) {
            group.register_peers(pool.clone())?;
        }
    }

    start_api(&platform, &config, groups);

    platform.require::<Server>().event_loop().await;

    Ok(())
}
