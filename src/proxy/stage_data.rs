//! Value carried by the stage output.

use crate::sdf::ScenePath;
use crate::usd::{Prim, PurposeFilter, StageHandle};
use crate::util::TimeCode;

/// The composed stage plus the node's render overlays.
///
/// `stage` is `None` when resolution failed; consumers then see an empty
/// scene rather than an error.
#[derive(Clone, Debug)]
pub struct StageData {
    pub stage: Option<StageHandle>,
    pub prim_path: ScenePath,
    pub exclude_prim_paths: Vec<ScenePath>,
    pub complexity: i32,
    pub purposes: PurposeFilter,
    pub time: TimeCode,
    pub exclude_prim_paths_version: u64,
    pub stage_version: u64,
}

impl StageData {
    /// The "no stage" value.
    pub fn empty() -> Self {
        Self {
            stage: None,
            prim_path: ScenePath::root(),
            exclude_prim_paths: Vec::new(),
            complexity: 0,
            purposes: PurposeFilter::default(),
            time: TimeCode::default(),
            exclude_prim_paths_version: 0,
            stage_version: 0,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.stage.is_some()
    }

    /// The prim at `prim_path`, if the stage has one.
    pub fn prim(&self) -> Option<Prim> {
        self.stage.as_ref()?.prim_at_path(&self.prim_path)
    }
}

impl Default for StageData {
    fn default() -> Self {
        Self::empty()
    }
}
