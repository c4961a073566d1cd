//! 调查状态：InvestigationState 与类型化 StateDiff
//!
//! InvestigationState 是唯一事实来源（replay-safe，全量可序列化）；只由 DurableCoordinator
//! 通过 apply(StateDiff) 修改。StateDiff 为「字段级补丁」：present 字段整体覆盖，absent 字段不变。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 调查阶段状态机；Complete / Failed 为终态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    QueryAnalysis,
    Planning,
    Retrieval,
    PivotAnalysis,
    Synthesis,
    Judge,
    Complete,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }
}

/// 实体类型（与 OSINT 常见目标对应）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Event,
    Identifier,
}

/// 调查实体：按规范化名称（小写）合并，confidence 始终在 [0,1]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub entity_type: EntityType,
    pub confidence: f64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: EntityType, confidence: f64) -> Self {
        Self {
            name: name.into(),
            entity_type,
            confidence: confidence.clamp(0.0, 1.0),
            attributes: BTreeMap::new(),
            aliases: Vec::new(),
        }
    }

    /// 合并键：大小写不敏感的名称
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// 来源类别，检索时每类并行派发一个任务
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    Web,
    News,
    Social,
    Academic,
    Business,
    PublicRecords,
}

impl SourceType {
    /// 全部类别（RetrievalManager 扇出顺序）
    pub const ALL: [SourceType; 6] = [
        SourceType::Web,
        SourceType::News,
        SourceType::Social,
        SourceType::Academic,
        SourceType::Business,
        SourceType::PublicRecords,
    ];
}

/// 检索到的来源；(url, source_type) 为去重键
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub source_type: SourceType,
    pub title: String,
    pub content: String,
    pub credibility: f64,
    pub retrieved_at: DateTime<Utc>,
}

impl Source {
    /// 去重键 (url, source_type)
    pub fn dedup_key(&self) -> (String, SourceType) {
        (self.url.clone(), self.source_type)
    }
}

/// 研究问题优先级
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// 研究问题状态：只允许向前推进 Pending -> InProgress -> {Completed | Failed}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl QuestionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestionStatus::Completed | QuestionStatus::Failed)
    }

    /// 推进序号，用于禁止状态回退
    fn rank(&self) -> u8 {
        match self {
            QuestionStatus::Pending => 0,
            QuestionStatus::InProgress => 1,
            QuestionStatus::Completed => 2,
            QuestionStatus::Failed => 2,
        }
    }
}

/// 单个研究问题及其回答与来源
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResearchQuestion {
    pub text: String,
    pub priority: Priority,
    pub status: QuestionStatus,
    #[serde(default)]
    pub answer: String,
    /// 回答引用的来源 URL
    #[serde(default)]
    pub sources: Vec<String>,
    pub created_step: u32,
}

impl ResearchQuestion {
    pub fn new(text: impl Into<String>, priority: Priority, created_step: u32) -> Self {
        Self {
            text: text.into(),
            priority,
            status: QuestionStatus::Pending,
            answer: String::new(),
            sources: Vec::new(),
            created_step,
        }
    }
}

/// Judge 阶段输出的质量评审，各分数在 [0,1]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QualityReview {
    pub overall_score: f64,
    pub completeness_score: f64,
    pub accuracy_score: f64,
    pub source_diversity_score: f64,
    pub approval_status: String,
    #[serde(default)]
    pub improvements: Vec<String>,
}

/// 调查全量状态（唯一事实来源）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvestigationState {
    pub query: String,
    pub investigation_id: String,
    pub phase: Phase,
    pub step: u32,
    pub max_steps: u32,
    /// 查询分析产出的扩展上下文，供后续阶段 Prompt 使用
    #[serde(default)]
    pub investigation_context: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub research_questions: Vec<ResearchQuestion>,
    /// 检索游标：下一个待回答的问题下标
    #[serde(default)]
    pub current_question_index: usize,
    #[serde(default)]
    pub pivot_strategies: Vec<String>,
    #[serde(default)]
    pub information_gaps: Vec<String>,
    /// 审计轨迹（错误、降级、关键事件），只追加
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub reflection_sufficient: bool,
    #[serde(default)]
    pub final_report: String,
    #[serde(default)]
    pub quality: Option<QualityReview>,
}

impl InvestigationState {
    pub fn new(query: impl Into<String>, max_steps: u32) -> Self {
        Self {
            query: query.into(),
            investigation_id: uuid::Uuid::new_v4().to_string(),
            phase: Phase::QueryAnalysis,
            step: 0,
            max_steps,
            investigation_context: String::new(),
            entities: Vec::new(),
            sources: Vec::new(),
            research_questions: Vec::new(),
            current_question_index: 0,
            pivot_strategies: Vec::new(),
            information_gaps: Vec::new(),
            notes: Vec::new(),
            reflection_sufficient: false,
            final_report: String::new(),
            quality: None,
        }
    }

    /// 本超步之后还剩多少步预算（含当前未提交的一步）
    pub fn remaining_budget(&self) -> u32 {
        self.max_steps.saturating_sub(self.step)
    }

    /// 应用一个超步的 diff：present 字段整体覆盖；step 单调不减；问题状态禁止回退
    pub fn apply(&mut self, diff: StateDiff) {
        // step 单调性：diff 总是带递增后的 step
        self.step = self.step.max(diff.step).min(self.max_steps);

        if let Some(phase) = diff.phase {
            self.phase = phase;
        }
        if let Some(context) = diff.investigation_context {
            self.investigation_context = context;
        }
        if let Some(entities) = diff.entities {
            self.entities = entities;
        }
        if let Some(sources) = diff.sources {
            self.sources = sources;
        }
        if let Some(mut questions) = diff.research_questions {
            // 禁止回退：相同下标的问题状态只能向前
            for (i, q) in questions.iter_mut().enumerate() {
                if let Some(old) = self.research_questions.get(i) {
                    if q.status.rank() < old.status.rank() {
                        q.status = old.status;
                    }
                }
            }
            self.research_questions = questions;
        }
        if let Some(index) = diff.current_question_index {
            self.current_question_index = self.current_question_index.max(index);
        }
        self.pivot_strategies.extend(diff.pivot_strategies);
        self.information_gaps.extend(diff.information_gaps);
        self.notes.extend(diff.notes);
        if let Some(sufficient) = diff.reflection_sufficient {
            self.reflection_sufficient = sufficient;
        }
        if let Some(report) = diff.final_report {
            self.final_report = report;
        }
        if let Some(quality) = diff.quality {
            self.quality = Some(quality);
        }
    }

    /// 终止判定（每次 merge 之后评估）
    ///
    /// - 终态阶段；
    /// - final_report 非空且质量评审已完成（Judge 尚未执行时不提前终止）；
    /// - 全部问题到达终态且 reflection_sufficient，且不处于收尾阶段（Synthesis/Judge 仍需执行）；
    /// - 步数预算耗尽。
    pub fn should_terminate(&self) -> bool {
        if self.phase.is_terminal() {
            return true;
        }
        if self.step >= self.max_steps {
            return true;
        }
        if !self.final_report.is_empty() && self.phase != Phase::Judge {
            return true;
        }
        if self.reflection_sufficient
            && !self.research_questions.is_empty()
            && self.research_questions.iter().all(|q| q.status.is_terminal())
            && !matches!(self.phase, Phase::Synthesis | Phase::Judge)
        {
            return true;
        }
        false
    }
}

/// 一个超步产生的状态补丁；absent 字段表示「不变」
///
/// pivot_strategies / information_gaps / notes 为只追加轨迹，diff 中的条目追加到原有列表。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateDiff {
    /// 必填：执行器总是返回递增后的 step
    pub step: u32,
    pub phase: Option<Phase>,
    pub investigation_context: Option<String>,
    pub entities: Option<Vec<Entity>>,
    pub sources: Option<Vec<Source>>,
    pub research_questions: Option<Vec<ResearchQuestion>>,
    pub current_question_index: Option<usize>,
    #[serde(default)]
    pub pivot_strategies: Vec<String>,
    #[serde(default)]
    pub information_gaps: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    pub reflection_sufficient: Option<bool>,
    pub final_report: Option<String>,
    pub quality: Option<QualityReview>,
}

impl StateDiff {
    /// 基于当前状态的空 diff（step 已递增）
    pub fn next_step(state: &InvestigationState) -> Self {
        Self {
            step: state.step + 1,
            ..Self::default()
        }
    }
}
