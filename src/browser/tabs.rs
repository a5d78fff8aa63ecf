//! 标签存储：持有所有打开的标签，维护「恰好一个活动标签」不变量
//!
//! 非空集合中恰有一个 `is_active = true`；空集合没有活动标签。
//! TabStore 是 `is_active` 与 `load_state` 的唯一写入方，导航控制器只能通过
//! begin_load / finish_load 请求加载状态迁移。

use std::fmt;

use serde::Serialize;

use crate::core::ShellError;

/// 标签句柄：会话内单调分配，关闭后不复用
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TabId(u64);

impl TabId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// 标签加载状态
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// 单个浏览器标签
#[derive(Clone, Debug, Serialize)]
pub struct Tab {
    pub id: TabId,
    pub url: String,
    pub title: String,
    pub is_active: bool,
    pub load_state: LoadState,
    /// 最近一次加载请求的序号；旧序号的完成回调会被忽略
    #[serde(skip)]
    load_seq: u64,
}

/// 标签集合（按创建顺序保存）
#[derive(Debug, Default)]
pub struct TabStore {
    tabs: Vec<Tab>,
    next_id: u64,
}

impl TabStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新建标签并设为活动，其余标签全部降为非活动；url 原样保存（校验由导航控制器负责）
    pub fn create_tab(&mut self, url: impl Into<String>) -> Tab {
        self.next_id += 1;
        for t in &mut self.tabs {
            t.is_active = false;
        }
        let tab = Tab {
            id: TabId(self.next_id),
            url: url.into(),
            title: "新标签页".to_string(),
            is_active: true,
            load_state: LoadState::Idle,
            load_seq: 0,
        };
        self.tabs.push(tab.clone());
        tracing::debug!(tab = %tab.id, url = %tab.url, "tab created");
        tab
    }

    /// 关闭标签；若关闭的是活动标签且仍有剩余，激活创建最晚的剩余标签
    pub fn close_tab(&mut self, id: TabId) -> Result<(), ShellError> {
        let idx = self.index_of(id)?;
        let removed = self.tabs.remove(idx);
        if removed.is_active {
            // TabId 单调递增，最大的 id 即创建最晚的标签
            if let Some(latest) = self.tabs.iter_mut().max_by_key(|t| t.id) {
                latest.is_active = true;
            }
        }
        tracing::debug!(tab = %id, remaining = self.tabs.len(), "tab closed");
        Ok(())
    }

    /// 原子地把活动标签切换为 id
    pub fn set_active(&mut self, id: TabId) -> Result<(), ShellError> {
        self.index_of(id)?;
        for t in &mut self.tabs {
            t.is_active = t.id == id;
        }
        Ok(())
    }

    pub fn list_tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn get(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn active(&self) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.is_active)
    }

    pub fn active_id(&self) -> Option<TabId> {
        self.active().map(|t| t.id)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn set_title(&mut self, id: TabId, title: impl Into<String>) -> Result<(), ShellError> {
        let idx = self.index_of(id)?;
        self.tabs[idx].title = title.into();
        Ok(())
    }

    /// 开始一次加载：写入 url、置为 Loading，返回该标签新的加载序号
    pub fn begin_load(&mut self, id: TabId, url: impl Into<String>) -> Result<u64, ShellError> {
        let idx = self.index_of(id)?;
        let tab = &mut self.tabs[idx];
        tab.url = url.into();
        tab.load_state = LoadState::Loading;
        tab.load_seq += 1;
        Ok(tab.load_seq)
    }

    /// 不发起加载，直接把标签标记为失败（如空 URL），同时作废尚未返回的加载
    pub fn fail_load(&mut self, id: TabId, reason: impl Into<String>) -> Result<(), ShellError> {
        let idx = self.index_of(id)?;
        let tab = &mut self.tabs[idx];
        tab.load_seq += 1;
        tab.load_state = LoadState::Failed(reason.into());
        Ok(())
    }

    /// 应用加载结果；仅当 seq 是该标签最新的加载序号时生效，返回是否生效
    pub fn finish_load(&mut self, id: TabId, seq: u64, state: LoadState) -> Result<bool, ShellError> {
        let idx = self.index_of(id)?;
        let tab = &mut self.tabs[idx];
        if tab.load_seq != seq {
            tracing::debug!(tab = %id, seq, latest = tab.load_seq, "stale load result ignored");
            return Ok(false);
        }
        tab.load_state = state;
        Ok(true)
    }

    /// 校验活动标签不变量
    pub fn check_invariant(&self) -> bool {
        let active = self.tabs.iter().filter(|t| t.is_active).count();
        if self.tabs.is_empty() {
            active == 0
        } else {
            active == 1
        }
    }

    fn index_of(&self, id: TabId) -> Result<usize, ShellError> {
        self.tabs
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| ShellError::NotFound(format!("tab {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tab_activates_newest() {
        let mut store = TabStore::new();
        let ris = store.create_tab("http://localhost:8080/ris");
        assert!(store.check_invariant());
        let pis = store.create_tab("pis.local");

        assert_eq!(store.len(), 2);
        assert_eq!(store.active_id(), Some(pis.id));
        assert!(!store.get(ris.id).unwrap().is_active);
        assert_eq!(store.get(pis.id).unwrap().load_state, LoadState::Idle);
        assert!(store.check_invariant());

        store.close_tab(pis.id).unwrap();
        assert_eq!(store.active_id(), Some(ris.id));
        assert!(store.check_invariant());
    }

    #[test]
    fn test_malformed_url_stored_as_given() {
        let mut store = TabStore::new();
        let tab = store.create_tab("not a url at all");
        assert_eq!(store.get(tab.id).unwrap().url, "not a url at all");
    }

    #[test]
    fn test_close_active_picks_most_recent_remaining() {
        let mut store = TabStore::new();
        let a = store.create_tab("a");
        let b = store.create_tab("b");
        let c = store.create_tab("c");
        store.set_active(b.id).unwrap();

        store.close_tab(b.id).unwrap();
        assert_eq!(store.active_id(), Some(c.id));

        store.close_tab(c.id).unwrap();
        assert_eq!(store.active_id(), Some(a.id));
        assert!(store.check_invariant());
    }

    #[test]
    fn test_close_inactive_keeps_active() {
        let mut store = TabStore::new();
        let a = store.create_tab("a");
        let b = store.create_tab("b");
        store.close_tab(a.id).unwrap();
        assert_eq!(store.active_id(), Some(b.id));
    }

    #[test]
    fn test_close_last_tab_leaves_empty_selection() {
        let mut store = TabStore::new();
        let a = store.create_tab("a");
        store.close_tab(a.id).unwrap();
        assert!(store.is_empty());
        assert!(store.active().is_none());
        assert!(store.check_invariant());
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let mut store = TabStore::new();
        let a = store.create_tab("a");
        store.close_tab(a.id).unwrap();

        assert!(matches!(store.set_active(a.id), Err(ShellError::NotFound(_))));
        assert!(matches!(store.close_tab(a.id), Err(ShellError::NotFound(_))));
        assert!(store.check_invariant());
    }

    #[test]
    fn test_ids_never_reused() {
        let mut store = TabStore::new();
        let a = store.create_tab("a");
        store.close_tab(a.id).unwrap();
        let b = store.create_tab("b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_stale_load_result_ignored() {
        let mut store = TabStore::new();
        let a = store.create_tab("a");
        let first = store.begin_load(a.id, "https://a/1").unwrap();
        let second = store.begin_load(a.id, "https://a/2").unwrap();

        assert!(!store
            .finish_load(a.id, first, LoadState::Failed("late".into()))
            .unwrap());
        assert_eq!(store.get(a.id).unwrap().load_state, LoadState::Loading);

        assert!(store.finish_load(a.id, second, LoadState::Loaded).unwrap());
        assert_eq!(store.get(a.id).unwrap().load_state, LoadState::Loaded);
        assert_eq!(store.get(a.id).unwrap().url, "https://a/2");
    }

    /// 一个操作：`(kind, pick)`，kind 决定新建 / 关闭 / 切换，pick 选择已发放的 id
    fn apply_op(store: &mut TabStore, issued: &mut Vec<TabId>, kind: u8, pick: u8) -> bool {
        match kind % 3 {
            0 => {
                let tab = store.create_tab(format!("https://sys{}.local", issued.len()));
                issued.push(tab.id);
                store.active_id() == Some(tab.id)
            }
            1 if !issued.is_empty() => {
                let id = issued[pick as usize % issued.len()];
                let was_active = store.active_id() == Some(id);
                let expected_next = store
                    .list_tabs()
                    .iter()
                    .filter(|t| t.id != id)
                    .map(|t| t.id)
                    .max();
                match store.close_tab(id) {
                    Ok(()) => !was_active || store.active_id() == expected_next,
                    Err(_) => store.get(id).is_none(),
                }
            }
            _ if !issued.is_empty() => {
                let id = issued[pick as usize % issued.len()];
                let exists = store.get(id).is_some();
                let res = store.set_active(id);
                res.is_ok() == exists && (!exists || store.active_id() == Some(id))
            }
            _ => true,
        }
    }

    #[test]
    fn test_invariant_holds_for_any_sequence() {
        fn prop(ops: Vec<(u8, u8)>) -> bool {
            let mut store = TabStore::new();
            let mut issued = Vec::new();
            ops.into_iter().all(|(kind, pick)| {
                apply_op(&mut store, &mut issued, kind, pick) && store.check_invariant()
            })
        }
        quickcheck::QuickCheck::new()
            .tests(300)
            .quickcheck(prop as fn(Vec<(u8, u8)>) -> bool);
    }
}
