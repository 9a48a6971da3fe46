//! Prim purposes and the draw-purpose toggles.

/// What a prim is for. `Default` prims always draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Purpose {
    #[default]
    Default,
    Render,
    Proxy,
    Guide,
}

impl Purpose {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "default" => Self::Default,
            "render" => Self::Render,
            "proxy" => Self::Proxy,
            "guide" => Self::Guide,
            _ => return None,
        })
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Render => "render",
            Self::Proxy => "proxy",
            Self::Guide => "guide",
        }
    }
}

/// Which non-default purposes are drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PurposeFilter {
    pub render: bool,
    pub proxy: bool,
    pub guide: bool,
}

impl Default for PurposeFilter {
    fn default() -> Self {
        Self { render: false, proxy: true, guide: false }
    }
}

impl PurposeFilter {
    pub fn includes(&self, purpose: Purpose) -> bool {
        match purpose {
            Purpose::Default => true,
            Purpose::Render => self.render,
            Purpose::Proxy => self.proxy,
            Purpose::Guide => self.guide,
        }
    }
}
