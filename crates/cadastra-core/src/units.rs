//! 距离单位与角度格式
//!
//! 观测值内部一律以米和弧度保存，这里只负责录入单位的换算和文本格式化。

use serde::{Deserialize, Serialize};

/// 距离单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Meters,
    Feet,
    Chains,
}

impl DistanceUnit {
    pub const ALL: [DistanceUnit; 3] = [DistanceUnit::Meters, DistanceUnit::Feet, DistanceUnit::Chains];

    /// 单位缩写
    pub fn abbreviation(&self) -> &'static str {
        match self {
            DistanceUnit::Meters => "m",
            DistanceUnit::Feet => "ft",
            DistanceUnit::Chains => "ch",
        }
    }

    /// 一个单位等于多少米
    pub fn multiplier(&self) -> f64 {
        match self {
            DistanceUnit::Meters => 1.0,
            DistanceUnit::Feet => 0.3048,
            DistanceUnit::Chains => 20.1168,
        }
    }

    pub fn to_meters(&self, value: f64) -> f64 {
        value * self.multiplier()
    }

    pub fn from_meters(&self, meters: f64) -> f64 {
        meters / self.multiplier()
    }

    /// 按缩写查找单位（不区分大小写，允许前缀，例如 `f` 表示英尺）
    pub fn from_abbreviation(abbr: &str) -> Option<Self> {
        let a = abbr.to_ascii_lowercase();
        if a.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|u| u.abbreviation().starts_with(&a))
    }

    /// 格式化米制距离：去掉末尾多余的零，可选附加缩写
    pub fn format(&self, meters: f64, with_abbreviation: bool) -> String {
        let value = self.from_meters(meters);
        let mut s = match self {
            DistanceUnit::Feet => format!("{:.2}", value),
            DistanceUnit::Chains => format!("{:.4}", value),
            DistanceUnit::Meters => format!("{:.3}", value),
        };
        if s.contains('.') {
            while s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
        }
        if with_abbreviation {
            s.push_str(self.abbreviation());
        }
        s
    }
}

impl std::fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DistanceUnit::Meters => "meters",
            DistanceUnit::Feet => "feet",
            DistanceUnit::Chains => "chains",
        };
        f.write_str(name)
    }
}

/// 把弧度格式化为 `D-MM-SS.sss`
pub fn format_dms(radians: f64) -> String {
    let signed = radians.to_degrees();
    let abs = signed.abs();
    let mut deg = abs.trunc() as u32;
    let rem = abs.fract() * 60.0;
    let mut mins = rem.trunc() as u32;
    let mut secs = rem.fract() * 60.0;

    // 避免出现 60 秒或 60 分
    if (secs - 60.0).abs() < 0.001 {
        secs = 0.0;
        mins += 1;
    }
    if mins >= 60 {
        mins = 0;
        deg += 1;
    }

    let s = format!("{}-{:02}-{:06.3}", deg, mins, secs);
    if signed < 0.0 {
        format!("-{}", s)
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        assert!((DistanceUnit::Feet.to_meters(100.0) - 30.48).abs() < 1e-9);
        assert!((DistanceUnit::Chains.from_meters(20.1168) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_abbreviation_lookup() {
        assert_eq!(DistanceUnit::from_abbreviation("M"), Some(DistanceUnit::Meters));
        assert_eq!(DistanceUnit::from_abbreviation("f"), Some(DistanceUnit::Feet));
        assert_eq!(DistanceUnit::from_abbreviation("ch"), Some(DistanceUnit::Chains));
        assert_eq!(DistanceUnit::from_abbreviation("km"), None);
        assert_eq!(DistanceUnit::from_abbreviation(""), None);
    }

    #[test]
    fn test_format_strips_zeros() {
        assert_eq!(DistanceUnit::Meters.format(100.0, true), "100m");
        assert_eq!(DistanceUnit::Meters.format(12.5, false), "12.5");
        assert_eq!(DistanceUnit::Feet.format(30.48, true), "100ft");
    }

    #[test]
    fn test_format_dms() {
        assert_eq!(format_dms(45f64.to_radians()), "45-00-00.000");
        assert_eq!(format_dms((90.0 + 30.0 / 60.0 + 15.0 / 3600.0f64).to_radians()), "90-30-15.000");
        assert_eq!(format_dms(-(10.5f64).to_radians()), "-10-30-00.000");
    }
}
