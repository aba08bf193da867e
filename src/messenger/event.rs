/// 触发事件的能力接口
///
/// 核心逻辑只通过这几个访问器读取事件，由各宿主的适配层实现。
pub trait EventSource: Send + Sync {
    /// 发送者 ID，无法确定时返回 None
    fn sender_id(&self) -> Option<String>;

    /// 事件自带的平台标识
    fn platform_id(&self) -> Option<String>;

    /// 适配器名称，平台标识缺失时作为备选
    fn adapter_name(&self) -> Option<String> {
        None
    }

    /// 群号，私聊为 None
    fn group_id(&self) -> Option<String>;

    /// 发送者显示名称
    fn sender_name(&self) -> Option<String> {
        None
    }

    /// 用于日志和转发的发送者描述: "昵称(ID)"
    fn describe_sender(&self) -> String {
        let id = self.sender_id().unwrap_or_else(|| "未知".to_string());
        match self.sender_name() {
            Some(name) if !name.is_empty() => format!("{}({})", name, id),
            _ => id,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::EventSource;

    /// 测试用事件
    #[derive(Debug, Clone, Default)]
    pub struct MockEvent {
        pub sender: Option<String>,
        pub platform: Option<String>,
        pub adapter: Option<String>,
        pub group: Option<String>,
        pub name: Option<String>,
    }

    impl MockEvent {
        pub fn private(sender: &str) -> Self {
            Self {
                sender: Some(sender.to_string()),
                platform: Some("qq".to_string()),
                ..Default::default()
            }
        }

        pub fn group(sender: &str, group: &str) -> Self {
            Self {
                group: Some(group.to_string()),
                ..Self::private(sender)
            }
        }
    }

    impl EventSource for MockEvent {
        fn sender_id(&self) -> Option<String> {
            self.sender.clone()
        }

        fn platform_id(&self) -> Option<String> {
            self.platform.clone()
        }

        fn adapter_name(&self) -> Option<String> {
            self.adapter.clone()
        }

        fn group_id(&self) -> Option<String> {
            self.group.clone()
        }

        fn sender_name(&self) -> Option<String> {
            self.name.clone()
        }
    }
}
