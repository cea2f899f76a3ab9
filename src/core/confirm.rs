//! 确认闸门：删除 / 取消 / 完成等操作在执行前挂起等待用户的是/否
//!
//! 闸门本身没有超时；拒绝即放弃本次迁移，不改状态也不写存储。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

/// 需要用户确认的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmRequest {
    CompleteRun {
        route_name: String,
        collected: usize,
        total: usize,
    },
    CancelRun {
        route_name: String,
    },
    DeleteRoute {
        route_name: String,
    },
    ReplaceAllRoutes {
        incoming: usize,
        existing: usize,
    },
}

impl ConfirmRequest {
    /// 提示文本
    pub fn prompt(&self) -> String {
        match self {
            ConfirmRequest::CompleteRun {
                route_name,
                collected,
                total,
            } => format!(
                "Complete run of '{}'? {}/{} items collected.",
                route_name, collected, total
            ),
            ConfirmRequest::CancelRun { route_name } => {
                format!("Cancel tracking '{}'? Progress will be discarded.", route_name)
            }
            ConfirmRequest::DeleteRoute { route_name } => {
                format!("Delete route '{}'? This cannot be undone.", route_name)
            }
            ConfirmRequest::ReplaceAllRoutes { incoming, existing } => format!(
                "Replace all {} existing routes with {} imported routes?",
                existing, incoming
            ),
        }
    }
}

#[async_trait]
pub trait ConfirmGate: Send + Sync {
    /// 返回 true 表示用户确认
    async fn confirm(&self, request: &ConfirmRequest) -> bool;
}

/// 固定应答的闸门（脚本化与测试用），记录被询问次数
#[derive(Debug)]
pub struct StaticConfirm {
    answer: AtomicBool,
    asked: AtomicUsize,
}

impl StaticConfirm {
    pub fn accepting() -> Self {
        Self::new(true)
    }

    pub fn declining() -> Self {
        Self::new(false)
    }

    fn new(answer: bool) -> Self {
        Self {
            answer: AtomicBool::new(answer),
            asked: AtomicUsize::new(0),
        }
    }

    pub fn set_answer(&self, answer: bool) {
        self.answer.store(answer, Ordering::SeqCst);
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmGate for StaticConfirm {
    async fn confirm(&self, request: &ConfirmRequest) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.load(Ordering::SeqCst);
        tracing::debug!("Auto-answering '{}' with {}", request.prompt(), answer);
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_confirm_counts_questions() {
        let gate = StaticConfirm::declining();
        let request = ConfirmRequest::CancelRun {
            route_name: "Loop".into(),
        };
        assert!(!gate.confirm(&request).await);
        gate.set_answer(true);
        assert!(gate.confirm(&request).await);
        assert_eq!(gate.asked(), 2);
    }

    #[test]
    fn test_prompt_mentions_progress() {
        let prompt = ConfirmRequest::CompleteRun {
            route_name: "Loop".into(),
            collected: 3,
            total: 5,
        }
        .prompt();
        assert!(prompt.contains("Loop"));
        assert!(prompt.contains("3/5"));
    }
}
