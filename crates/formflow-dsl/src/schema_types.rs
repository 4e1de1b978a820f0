// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Form DSL Type Definitions - Single Source of Truth
//
// These types define the form file structure and are used by:
// 1. Runtime - for deserializing form JSON before submission
// 2. Interpreter - for type-safe access to the action tree
// 3. form_json_schema() - for generating the JSON Schema via schemars

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display, EnumString, VariantNames};

/// DSL version - bump when making breaking changes
pub const DSL_VERSION: &str = "1.0.0";

/// Submitted form values keyed by field id.
pub type ValueBag = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Root Types
// ============================================================================

/// Complete form definition: the fields a user fills in and the action chain
/// executed on submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormConfig {
    /// Stable form identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable form name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Fields collected from the user
    #[serde(default)]
    pub fields: Vec<FormField>,

    /// Ordered action chain executed on submission
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Named action groups that `group` actions may reference by id
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_groups: Vec<ActionGroup>,

    /// Detach the chain into a background task and return immediately
    #[serde(default)]
    pub run_in_background: bool,

    /// Do not show the success notification after submission
    #[serde(default)]
    pub suppress_success_notice: bool,

    /// Per-form timeout override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutSettings>,
}

impl FormConfig {
    /// Find a field by id, falling back to a label match.
    pub fn field(&self, key: &str) -> Option<&FormField> {
        self.fields
            .iter()
            .find(|f| f.id == key)
            .or_else(|| self.fields.iter().find(|f| f.label == key))
    }

    /// Find a named action group.
    pub fn action_group(&self, id: &str) -> Option<&ActionGroup> {
        self.action_groups.iter().find(|g| g.id == id)
    }

    /// Default values of every field that declares one.
    pub fn default_values(&self) -> ValueBag {
        self.fields
            .iter()
            .filter_map(|f| f.default_value.clone().map(|v| (f.id.clone(), v)))
            .collect()
    }
}

/// Timeout policy for one form's submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutSettings {
    /// Whether the deadline timer is armed
    #[serde(default)]
    pub enabled: bool,

    /// Seconds before the submission is cancelled
    pub threshold_seconds: u64,
}

// ============================================================================
// Fields
// ============================================================================

/// A single input collected by the form.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    /// Key under which the value is stored in the value bag
    pub id: String,

    /// Display label; `{{@label}}` references resolve through it
    pub label: String,

    /// Field kind
    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    /// Whether a visible field must have a value on submission
    #[serde(default)]
    pub required: bool,

    /// Value used when the submission does not provide one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,

    /// Choices for select/radio fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<serde_json::Value>,

    /// Field is shown only when this filter holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Filter>,
}

/// Field kinds. Rendering is the host's concern; the engine only cares about
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Textarea,
    Number,
    Date,
    Time,
    Datetime,
    Checkbox,
    Toggle,
    Select,
    Radio,
    File,
    Password,
}

// ============================================================================
// Actions
// ============================================================================

/// Union of all action kinds, discriminated by the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    /// Create a note from a template
    CreateFile(CreateFileAction),

    /// Insert text into an existing note
    InsertText(InsertTextAction),

    /// Transform text and store the result in an output variable
    TextTransform(TextTransformAction),

    /// Call the AI collaborator with a prompt
    Ai(AiAction),

    /// Accumulate a value across loop iterations
    CollectData(CollectDataAction),

    /// Repeat a nested action list
    Loop(LoopAction),

    /// No-op branch terminator
    Continue(ContinueAction),

    /// Leave the innermost loop
    Break(BreakAction),

    /// Ask the user to pick one option
    SuggestModal(SuggestModalAction),

    /// Ask the user for additional field values
    GenerateForm(GenerateFormAction),

    /// Submit or open another form file
    Button(ButtonAction),

    /// Pause the chain for a while
    Wait(WaitAction),

    /// Run nested actions under one error policy
    Group(GroupAction),
}

impl Action {
    /// Fields shared by every action kind.
    pub fn common(&self) -> &ActionCommon {
        match self {
            Action::CreateFile(a) => &a.common,
            Action::InsertText(a) => &a.common,
            Action::TextTransform(a) => &a.common,
            Action::Ai(a) => &a.common,
            Action::CollectData(a) => &a.common,
            Action::Loop(a) => &a.common,
            Action::Continue(a) => &a.common,
            Action::Break(a) => &a.common,
            Action::SuggestModal(a) => &a.common,
            Action::GenerateForm(a) => &a.common,
            Action::Button(a) => &a.common,
            Action::Wait(a) => &a.common,
            Action::Group(a) => &a.common,
        }
    }

    /// Stable action identifier.
    pub fn id(&self) -> &str {
        &self.common().id
    }

    /// The `type` tag as written in form files.
    pub fn action_type(&self) -> &'static str {
        match self {
            Action::CreateFile(_) => "createFile",
            Action::InsertText(_) => "insertText",
            Action::TextTransform(_) => "textTransform",
            Action::Ai(_) => "ai",
            Action::CollectData(_) => "collectData",
            Action::Loop(_) => "loop",
            Action::Continue(_) => "continue",
            Action::Break(_) => "break",
            Action::SuggestModal(_) => "suggestModal",
            Action::GenerateForm(_) => "generateForm",
            Action::Button(_) => "button",
            Action::Wait(_) => "wait",
            Action::Group(_) => "group",
        }
    }

    /// Custom title if set, otherwise the type tag.
    pub fn display_title(&self) -> &str {
        self.common()
            .title
            .as_deref()
            .unwrap_or_else(|| self.action_type())
    }

    /// Inline child actions for loop and group actions.
    pub fn children(&self) -> Option<&[Action]> {
        match self {
            Action::Loop(a) => Some(&a.actions),
            Action::Group(a) => Some(&a.actions),
            _ => None,
        }
    }
}

/// Fields shared by all action kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionCommon {
    /// Unique action identifier
    pub id: String,

    /// Custom title shown in the editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Failure policy for this action; inherited from the enclosing group when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,

    /// Action (and its subtree) is skipped unless this filter holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Filter>,
}

impl ActionCommon {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_condition(mut self, condition: Filter) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_error_handling(mut self, strategy: ErrorHandling) -> Self {
        self.error_handling = Some(strategy);
        self
    }
}

/// What to do when an action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum ErrorHandling {
    /// Stop the whole chain and surface the error
    #[default]
    Abort,

    /// Log the failure and continue with the next sibling
    Skip,

    /// Re-run the action; abort once retries are exhausted
    Retry {
        /// Additional attempts after the first failure
        #[serde(rename = "maxRetries")]
        max_retries: u32,

        /// Delay between attempts in milliseconds
        #[serde(rename = "retryDelayMs", default, skip_serializing_if = "Option::is_none")]
        retry_delay_ms: Option<u64>,
    },
}

/// A named, reusable batch of actions sharing one failure policy.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionGroup {
    /// Group identifier referenced by `group` actions
    pub id: String,

    /// Human-readable group name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Failure policy applied to every member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handling: Option<ErrorHandling>,

    /// Member actions in execution order
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Create a note from a template.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// Target folder (template); empty means the vault root
    #[serde(default)]
    pub folder: String,

    /// File name (template); `.md` is appended when no extension is given
    pub file_name: String,

    /// File content (template)
    #[serde(default)]
    pub content: String,

    /// What to do when the target already exists
    #[serde(default)]
    pub conflict: ConflictStrategy,

    /// Store the created path under this output variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_variable: Option<String>,
}

/// Behaviour when a file being created already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ConflictStrategy {
    /// Leave the existing file untouched
    Skip,
    /// Replace the existing content
    Overwrite,
    /// Create `name 1.md`, `name 2.md`, ...
    #[default]
    Rename,
}

/// Insert text into a note.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InsertTextAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// Target note path (template)
    pub file_path: String,

    /// Text to insert (template)
    pub content: String,

    /// Where the text goes
    #[serde(default)]
    pub position: InsertPosition,

    /// Heading text for `afterHeading`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,

    /// Create the note when it does not exist
    #[serde(default)]
    pub create_if_missing: bool,
}

/// Insertion point inside a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum InsertPosition {
    /// After the frontmatter block, or at the very top
    Top,
    /// At the end of the note
    #[default]
    Bottom,
    /// Right below the line of the given heading
    AfterHeading,
}

/// Transform text and store the result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextTransformAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// Input text (template)
    pub source: String,

    /// Transformation to apply
    pub transform: TextTransform,

    /// Output variable receiving the result
    pub output_variable: String,
}

/// Text transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TextTransform {
    Upper,
    Lower,
    Trim,
    Capitalize,
    Slug,
}

/// Invoke the AI collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// User prompt (template)
    pub prompt: String,

    /// System prompt (template)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Model name passed through to the collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Output variable receiving the response text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_variable: Option<String>,
}

/// Accumulate data into an output variable inside a loop body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectDataAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// Output variable name
    pub output_variable: String,

    /// Value collected on each iteration (template)
    pub content: String,

    /// Shape of the output variable
    #[serde(default)]
    pub variable_type: CollectVariableType,

    /// Keep or discard earlier accumulation
    #[serde(default)]
    pub storage_mode: StorageMode,

    /// Text inserted between appended string values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
}

/// Shape of a collected output variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CollectVariableType {
    /// Concatenated text
    #[default]
    String,
    /// One element per iteration
    Array,
}

/// Whether a collect-data action keeps earlier values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Append,
    Replace,
}

/// Kinds of loop data sources.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoopType {
    /// Iterate over the elements of a list
    List,
    /// Repeat while a filter holds
    Condition,
    /// Iterate over a numeric range
    Count,
    /// Iterate over a list one page at a time
    Pagination,
}

/// Repeat a nested action list.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoopAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// Data source kind
    pub loop_type: LoopType,

    /// List for `list`/`pagination` loops: a JSON array, or a template that
    /// resolves to an array or to newline-separated text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_source: Option<serde_json::Value>,

    /// Range for `count` loops
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<CountRange>,

    /// Continuation test for `condition` loops, checked before each iteration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Filter>,

    /// Page size for `pagination` loops (default: 10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,

    /// Iteration cap; the engine's configured cap applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    /// Extra name bound to the current item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_variable: Option<String>,

    /// Extra name bound to the current index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_variable: Option<String>,

    /// Loop body
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Numeric range for count loops. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountRange {
    #[serde(default)]
    pub start: i64,
    pub end: i64,
    #[serde(default = "default_step")]
    pub step: i64,
}

fn default_step() -> i64 {
    1
}

/// No-op action used as an explicit branch terminator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContinueAction {
    #[serde(flatten)]
    pub common: ActionCommon,
}

/// Leave the innermost loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BreakAction {
    #[serde(flatten)]
    pub common: ActionCommon,
}

/// Ask the user to pick one of several options.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuggestModalAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// Prompt shown above the options (template)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    /// Options: a JSON array, or a template resolving to an array or lines
    pub options: serde_json::Value,

    /// Output variable receiving the chosen option
    pub output_variable: String,
}

/// Ask the user for more field values mid-chain.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateFormAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// Fields to ask for; answers are merged into the value bag
    pub fields: Vec<FormField>,
}

/// Trigger another form file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ButtonAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// Path of the form file in the document store (template)
    pub form_path: String,

    /// Submit with defaults, or open for user input first
    #[serde(default)]
    pub mode: ButtonMode,
}

/// How a button action launches its target form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ButtonMode {
    #[default]
    Submit,
    Open,
}

/// Pause the chain.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// Delay in milliseconds
    pub duration_ms: u64,
}

/// Run nested actions as an inner chain under the group's failure policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupAction {
    #[serde(flatten)]
    pub common: ActionCommon,

    /// Run the named `ActionGroup` instead of the inline actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    /// Inline member actions
    #[serde(default)]
    pub actions: Vec<Action>,
}

// ============================================================================
// Filters
// ============================================================================

/// Recursive boolean expression used for visibility and branching.
///
/// Leaf nodes (`type: "filter"`) compare `property` against `value` with
/// `operator`. Group nodes (`type: "group"`) combine `conditions` with
/// `relation` and ignore the leaf fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Leaf or group node
    #[serde(rename = "type", default)]
    pub filter_type: FilterType,

    /// Field id, field label or loop variable being tested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,

    /// Comparison operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<OperatorType>,

    /// Comparison value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    /// How group children are combined
    #[serde(default)]
    pub relation: Relation,

    /// Group children
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Filter>,
}

impl Filter {
    /// Leaf comparison node.
    pub fn leaf(
        property: impl Into<String>,
        operator: OperatorType,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            filter_type: FilterType::Filter,
            property: Some(property.into()),
            operator: Some(operator),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Group node requiring every child to hold.
    pub fn all(conditions: Vec<Filter>) -> Self {
        Self {
            filter_type: FilterType::Group,
            relation: Relation::And,
            conditions,
            ..Default::default()
        }
    }

    /// Group node requiring at least one child to hold.
    pub fn any(conditions: Vec<Filter>) -> Self {
        Self {
            filter_type: FilterType::Group,
            relation: Relation::Or,
            conditions,
            ..Default::default()
        }
    }

    pub fn is_group(&self) -> bool {
        self.filter_type == FilterType::Group
    }
}

/// Filter node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Filter,
    Group,
}

/// Logical combination of group children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    #[default]
    And,
    Or,
}

/// Comparison operators. Each maps to exactly one stateless handler.
///
/// Unrecognised operator names deserialize to [`OperatorType::Unknown`],
/// which always evaluates to `false`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    JsonSchema,
    Display,
    EnumString,
    AsRefStr,
    VariantNames,
)]
pub enum OperatorType {
    // Equality
    Equals,
    NotEquals,

    // Numeric comparison
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,

    // Membership
    Contains,
    NotContains,
    ContainsAny,

    // String
    StartsWith,
    EndsWith,
    RegexMatch,

    // Presence
    HasValue,
    NoValue,

    // File content
    FileContains,

    // Array length
    ArrayLengthEquals,
    ArrayLengthGreater,
    ArrayLengthLess,

    // Time
    TimeBefore,
    TimeAfter,
    TimeBeforeOrEqual,
    TimeAfterOrEqual,

    // Checkbox
    Checked,
    Unchecked,

    /// Any operator name this version does not know
    Unknown,
}

impl<'de> Deserialize<'de> for OperatorType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(name.parse().unwrap_or(OperatorType::Unknown))
    }
}
