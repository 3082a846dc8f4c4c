use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub op_width: f32,
    pub op_height: f32,
    pub data_width: f32,
    pub data_height: f32,
    pub placeholder_width: f32,
    pub placeholder_height: f32,
    /// Size of a collapsed abstractive container.
    pub collapsed_width: f32,
    pub collapsed_height: f32,
    /// Size of a collapsed temporal container; taller than wide so iterations read as
    /// columns.
    pub collapsed_temporal_width: f32,
    pub collapsed_temporal_height: f32,
    pub node_spacing: f32,
    pub rank_spacing: f32,
    pub container_padding: f32,
    /// Horizontal gap between consecutive temporal containers.
    pub temporal_gap: f32,
    /// Lateral distance between parallel temporal connectors at one node.
    pub lane_pitch: f32,
    /// Crossing-reduction sweeps of the default engine.
    pub order_passes: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            op_width: 80.0,
            op_height: 40.0,
            data_width: 25.0,
            data_height: 25.0,
            placeholder_width: 80.0,
            placeholder_height: 40.0,
            collapsed_width: 80.0,
            collapsed_height: 40.0,
            collapsed_temporal_width: 40.0,
            collapsed_temporal_height: 80.0,
            node_spacing: 40.0,
            rank_spacing: 40.0,
            container_padding: 30.0,
            temporal_gap: 40.0,
            lane_pitch: 10.0,
            order_passes: 4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub layout: LayoutConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    layout: Option<LayoutConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    op_width: Option<f32>,
    op_height: Option<f32>,
    data_width: Option<f32>,
    data_height: Option<f32>,
    placeholder_width: Option<f32>,
    placeholder_height: Option<f32>,
    collapsed_width: Option<f32>,
    collapsed_height: Option<f32>,
    collapsed_temporal_width: Option<f32>,
    collapsed_temporal_height: Option<f32>,
    node_spacing: Option<f32>,
    rank_spacing: Option<f32>,
    container_padding: Option<f32>,
    temporal_gap: Option<f32>,
    lane_pitch: Option<f32>,
    order_passes: Option<usize>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Accepts JSON or JSON5; every key is optional and falls back to the defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(vars) = parsed.layout {
        let layout = &mut config.layout;
        let sizes = [
            (vars.op_width, &mut layout.op_width),
            (vars.op_height, &mut layout.op_height),
            (vars.data_width, &mut layout.data_width),
            (vars.data_height, &mut layout.data_height),
            (vars.placeholder_width, &mut layout.placeholder_width),
            (vars.placeholder_height, &mut layout.placeholder_height),
            (vars.collapsed_width, &mut layout.collapsed_width),
            (vars.collapsed_height, &mut layout.collapsed_height),
            (vars.collapsed_temporal_width, &mut layout.collapsed_temporal_width),
            (vars.collapsed_temporal_height, &mut layout.collapsed_temporal_height),
            (vars.node_spacing, &mut layout.node_spacing),
            (vars.rank_spacing, &mut layout.rank_spacing),
            (vars.container_padding, &mut layout.container_padding),
            (vars.temporal_gap, &mut layout.temporal_gap),
            (vars.lane_pitch, &mut layout.lane_pitch),
        ];
        for (value, slot) in sizes {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    anyhow::bail!("layout sizes must be finite and non-negative, got {v}");
                }
                *slot = v;
            }
        }
        if let Some(v) = vars.order_passes {
            layout.order_passes = v;
        }
    }

    Ok(config)
}
