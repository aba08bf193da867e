pub mod adapter;
pub mod messenger;

use kovi::PluginBuilder as plugin;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{KoviEvent, KoviTransport, PLATFORM};
use crate::messenger::{ConfigStore, Courier, GroupHistory};

#[kovi::plugin]
async fn main() {
    let bot = plugin::get_runtime_bot();
    let data_path = bot.get_data_path();
    let config_json_path = data_path.join("config.json");
    let history_json_path = data_path.join("history.json");

    // 加载配置
    let store = Arc::new(ConfigStore::from_file(&config_json_path));
    let config = store.get_config();
    kovi::log::info!("✅ 已加载配置: {:?}", config_json_path);

    let history = Arc::new(GroupHistory::load(&history_json_path, config.history_limit));
    let transport = Arc::new(KoviTransport::new(Arc::clone(&bot), PLATFORM));

    let courier = Arc::new(
        Courier::new(Arc::clone(&store), transport, Arc::clone(&history))
            .with_config_path(&config_json_path),
    );
    let stats = courier.get_stats();
    kovi::log::info!("🚀 传话插件初始化成功");
    kovi::log::info!("   管理员: {}", if stats.admin_configured { "已配置" } else { "未配置" });
    kovi::log::info!("   LLM: {}", if stats.llm_enabled { "已启用" } else { "未启用" });
    kovi::log::info!("   群消息历史: {} 个群", stats.history_groups);

    // 配置热重载，插件卸载时由 kovi 终止
    if config.reload_interval > 0 {
        let store = Arc::clone(&store);
        let path = config_json_path.clone();
        let period = Duration::from_secs(config.reload_interval);
        kovi::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.reload_from_file(&path) {
                    Ok(true) => kovi::log::info!("🔄 检测到配置变更，已重新加载"),
                    Ok(false) => {}
                    Err(e) => kovi::log::warn!("⚠️  配置热重载失败: {:#}", e),
                }
            }
        });
    }

    // 定期保存群消息历史
    if config.history_save_interval > 0 {
        let history = Arc::clone(&history);
        let path = history_json_path.clone();
        let period = Duration::from_secs(config.history_save_interval);
        kovi::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match history.save_if_dirty(&path) {
                    Ok(true) => kovi::log::debug!("💾 群消息历史已保存: {:?}", path),
                    Ok(false) => {}
                    Err(e) => kovi::log::warn!("⚠️  定期保存群消息历史失败: {:#}", e),
                }
            }
        });
    }

    // 消息处理
    let handler_courier = Arc::clone(&courier);
    plugin::on_msg(move |event| {
        let courier = Arc::clone(&handler_courier);

        async move {
            let text = match event.borrow_text() {
                Some(t) => t,
                None => return,
            };

            let source = KoviEvent::new(Arc::clone(&event));
            if let Some(reply) = courier.on_message(&source, text).await {
                event.reply(&reply);
            }
        }
    });

    // 卸载时保存群消息历史
    plugin::drop(move || {
        let history = Arc::clone(&history);
        let path = history_json_path.clone();

        async move {
            match history.save(&path) {
                Ok(()) => kovi::log::info!("💾 群消息历史已保存: {:?}", path),
                Err(e) => kovi::log::error!("❌ 保存群消息历史失败: {:#}", e),
            }
        }
    });
}
