//! Node attribute surface and dirty propagation.

use crate::sdf::ScenePath;
use crate::usd::{InitialLoadSet, PurposeFilter, StageCacheId, StageHandle};
use crate::util::TimeCode;

/// Node attributes (plugs).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attr {
    FilePath,
    FilePathRelative,
    PrimPath,
    ExcludePrimPaths,
    LoadPayloads,
    ShareStage,
    Time,
    Complexity,
    InStageData,
    InStageDataCached,
    StageCacheId,
    DrawRenderPurpose,
    DrawProxyPurpose,
    DrawGuidePurpose,
    SessionLayerName,
    RootLayerName,
    MutedLayers,
    /// Persisted edit target identifier.
    TargetLayer,
    UpdateCounter,
    ResyncCounter,
    OutTime,
    OutStageData,
    OutStageCacheId,
}

impl Attr {
    /// Computed outputs, in pipeline order.
    pub const OUTPUTS: [Attr; 4] = [Attr::OutTime, Attr::InStageDataCached, Attr::OutStageData, Attr::OutStageCacheId];

    /// Host-side plug name.
    pub fn name(self) -> &'static str {
        match self {
            Attr::FilePath => "filePath",
            Attr::FilePathRelative => "filePathRelative",
            Attr::PrimPath => "primPath",
            Attr::ExcludePrimPaths => "excludePrimPaths",
            Attr::LoadPayloads => "loadPayloads",
            Attr::ShareStage => "shareStage",
            Attr::Time => "time",
            Attr::Complexity => "complexity",
            Attr::InStageData => "inStageData",
            Attr::InStageDataCached => "inStageDataCached",
            Attr::StageCacheId => "stageCacheId",
            Attr::DrawRenderPurpose => "drawRenderPurpose",
            Attr::DrawProxyPurpose => "drawProxyPurpose",
            Attr::DrawGuidePurpose => "drawGuidePurpose",
            Attr::SessionLayerName => "sessionLayerName",
            Attr::RootLayerName => "rootLayerName",
            Attr::MutedLayers => "mutedLayers",
            Attr::TargetLayer => "targetLayer",
            Attr::UpdateCounter => "updateCounter",
            Attr::ResyncCounter => "resyncCounter",
            Attr::OutTime => "outTime",
            Attr::OutStageData => "outStageData",
            Attr::OutStageCacheId => "outStageCacheId",
        }
    }

    pub fn is_output(self) -> bool {
        Self::OUTPUTS.contains(&self)
    }

    /// Outputs dirtied when this attribute changes.
    pub fn affects(self) -> &'static [Attr] {
        const STAGE: &[Attr] = &[Attr::InStageDataCached, Attr::OutStageData, Attr::OutStageCacheId];
        match self {
            Attr::Time => &[Attr::OutTime],
            Attr::FilePath
            | Attr::FilePathRelative
            | Attr::LoadPayloads
            | Attr::ShareStage
            | Attr::InStageData
            | Attr::StageCacheId
            | Attr::SessionLayerName
            | Attr::RootLayerName => STAGE,
            Attr::InStageDataCached => &[Attr::OutStageData, Attr::OutStageCacheId],
            Attr::PrimPath
            | Attr::ExcludePrimPaths
            | Attr::Complexity
            | Attr::DrawRenderPurpose
            | Attr::DrawProxyPurpose
            | Attr::DrawGuidePurpose => &[Attr::OutStageData],
            _ => &[],
        }
    }
}

/// Current attribute values.
#[derive(Clone, Debug)]
pub struct ProxyInputs {
    pub file_path: String,
    pub file_path_relative: bool,
    pub prim_path: String,
    /// Absolute paths, or paths relative to the prim path.
    pub exclude_prim_paths: Vec<String>,
    pub load_payloads: bool,
    pub share_stage: bool,
    pub time: TimeCode,
    pub complexity: i32,
    /// Connection from another node's stage output.
    pub in_stage_data: Option<StageHandle>,
    pub stage_cache_id: StageCacheId,
    pub draw_render_purpose: bool,
    pub draw_proxy_purpose: bool,
    pub draw_guide_purpose: bool,
    pub session_layer_name: String,
    pub root_layer_name: String,
    pub muted_layers: Vec<String>,
    pub target_layer: String,
}

impl Default for ProxyInputs {
    fn default() -> Self {
        Self {
            file_path: String::new(),
            file_path_relative: false,
            prim_path: String::new(),
            exclude_prim_paths: Vec::new(),
            load_payloads: true,
            share_stage: true,
            time: TimeCode::default(),
            complexity: 0,
            in_stage_data: None,
            stage_cache_id: StageCacheId::INVALID,
            draw_render_purpose: false,
            draw_proxy_purpose: true,
            draw_guide_purpose: false,
            session_layer_name: String::new(),
            root_layer_name: String::new(),
            muted_layers: Vec::new(),
            target_layer: String::new(),
        }
    }
}

impl ProxyInputs {
    pub fn load_set(&self) -> InitialLoadSet {
        InitialLoadSet::from_load_payloads(self.load_payloads)
    }

    pub fn purposes(&self) -> PurposeFilter {
        PurposeFilter {
            render: self.draw_render_purpose,
            proxy: self.draw_proxy_purpose,
            guide: self.draw_guide_purpose,
        }
    }

    /// Parsed prim path. Empty text means the pseudo-root.
    pub fn parsed_prim_path(&self) -> crate::Result<ScenePath> {
        let text = self.prim_path.trim();
        if text.is_empty() {
            return Ok(ScenePath::root());
        }
        ScenePath::new(text)
    }

    /// Exclude paths made absolute against `anchor`. Invalid entries are
    /// skipped with a warning.
    pub fn parsed_exclude_prim_paths(&self, anchor: &ScenePath) -> Vec<ScenePath> {
        let mut out = Vec::new();
        for text in &self.exclude_prim_paths {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let parsed = if text.starts_with('/') {
                ScenePath::new(text)
            } else {
                text.split('/')
                    .filter(|s| !s.is_empty())
                    .try_fold(anchor.clone(), |p, name| p.append_child(name))
            };
            match parsed {
                Ok(p) => out.push(p),
                Err(err) => tracing::warn!(path = %text, error = %err, "ignoring exclude prim path"),
            }
        }
        out
    }
}
