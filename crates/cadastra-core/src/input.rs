//! 观测值输入解析
//!
//! 支持的输入格式：
//! - 角度: `45`、`45.5`（十进制度）或 `45-30-15.5`（度-分-秒）
//! - 负角度: `-10-30`（分秒随度数符号一起减去）
//! - 距离: `100`（录入单位）、`100m`、`328.08ft`、`5ch`
//! - 坐标: `1000.0,2000.0`（东坐标,北坐标）

use crate::math::Point2;
use crate::units::DistanceUnit;
use thiserror::Error;

/// 解析错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Missing value: {0}")]
    MissingValue(String),

    #[error("Unknown distance unit: {0}")]
    UnknownUnit(String),
}

/// 输入解析器
pub struct InputParser;

impl InputParser {
    /// 解析角度，返回弧度
    pub fn parse_angle(input: &str) -> Result<f64, ParseError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ParseError::MissingValue("angle".to_string()));
        }
        let invalid = || ParseError::InvalidFormat(format!("Invalid angle: {}", s));

        let deg_str = Self::numeric_prefix(s, 0);
        let deg: f64 = deg_str.parse().map_err(|_| invalid())?;
        let negative = deg_str.starts_with('-');
        let mut degrees = deg.abs();

        let mut index = deg_str.len();
        for divisor in [60.0, 3600.0] {
            if index >= s.len() {
                break;
            }
            if s.as_bytes()[index] == b'-' {
                index += 1;
                if index >= s.len() {
                    break;
                }
            }
            let part = Self::numeric_prefix(s, index);
            // 分、秒不允许带符号
            if part.is_empty() || part.starts_with('-') {
                return Err(invalid());
            }
            let value: f64 = part.parse().map_err(|_| invalid())?;
            degrees += value / divisor;
            index += part.len();
        }

        if index != s.len() {
            return Err(invalid());
        }

        let degrees = if negative { -degrees } else { degrees };
        Ok(degrees.to_radians())
    }

    /// 解析距离，返回（米制数值，录入单位）
    ///
    /// 没有单位缩写时按 `entry_unit` 解释。
    pub fn parse_distance(input: &str, entry_unit: DistanceUnit) -> Result<(f64, DistanceUnit), ParseError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ParseError::MissingValue("distance".to_string()));
        }

        // 从末尾向前找到第一个非字母字符，之前是数值，之后是单位缩写
        let split = s
            .char_indices()
            .rev()
            .find(|(_, c)| !c.is_alphabetic())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let (num, abbr) = s.split_at(split);

        let value: f64 = num
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidFormat(format!("Invalid distance: {}", s)))?;

        let unit = if abbr.is_empty() {
            entry_unit
        } else {
            DistanceUnit::from_abbreviation(abbr).ok_or_else(|| ParseError::UnknownUnit(abbr.to_string()))?
        };

        Ok((unit.to_meters(value), unit))
    }

    /// 解析坐标 `x,y`
    pub fn parse_point(input: &str) -> Result<Point2, ParseError> {
        let s = input.trim();
        let (x_str, y_str) = s
            .split_once(',')
            .ok_or_else(|| ParseError::MissingValue(format!("Expected x,y but got: {}", s)))?;
        let x = x_str
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidFormat(format!("Invalid X coordinate: {}", x_str)))?;
        let y = y_str
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidFormat(format!("Invalid Y coordinate: {}", y_str)))?;
        Ok(Point2::new(x, y))
    }

    /// 从 `start` 开始截取数字子串；`-` 只允许出现在开头
    fn numeric_prefix(s: &str, start: usize) -> &str {
        let tail = &s[start..];
        let len = tail
            .char_indices()
            .take_while(|&(i, c)| (c == '-' && i == 0) || c == '.' || c.is_ascii_digit())
            .count();
        &tail[..len]
    }
}
