//! 坐标系统
//!
//! 观测距离是地面距离，地图坐标是投影平面坐标。两者之间的换算由
//! 线比例因子（line scale factor）给出：`平面距离 = 地面距离 × 因子`。

use crate::math::Point2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 地面距离到平面距离的换算
pub trait CoordinateSystem: std::fmt::Debug + Send + Sync {
    /// 系统名称
    fn name(&self) -> String;

    /// `start` 到 `end` 之间的线比例因子
    fn line_scale_factor(&self, start: &Point2, end: &Point2) -> f64;
}

/// 平面坐标系，地面距离即平面距离
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneSystem;

impl CoordinateSystem for PlaneSystem {
    fn name(&self) -> String {
        "Plane".to_string()
    }

    fn line_scale_factor(&self, _start: &Point2, _end: &Point2) -> f64 {
        1.0
    }
}

/// 全图使用同一个比例因子
#[derive(Debug, Clone, Copy)]
pub struct ConstantScale {
    pub factor: f64,
}

impl CoordinateSystem for ConstantScale {
    fn name(&self) -> String {
        format!("Constant scale {}", self.factor)
    }

    fn line_scale_factor(&self, _start: &Point2, _end: &Point2) -> f64 {
        self.factor
    }
}

/// 横轴墨卡托投影（UTM 参数为默认值）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransverseMercator {
    /// 椭球长半轴
    pub semi_major: f64,
    /// 椭球短半轴
    pub semi_minor: f64,
    /// 中央子午线比例因子
    pub scale_factor: f64,
    /// 东偏移
    pub false_easting: f64,
}

impl Default for TransverseMercator {
    fn default() -> Self {
        // GRS80 椭球
        Self {
            semi_major: 6_378_137.0,
            semi_minor: 6_356_752.3141,
            scale_factor: 0.9996,
            false_easting: 500_000.0,
        }
    }
}

impl TransverseMercator {
    fn eccentricity_sq(&self) -> f64 {
        let asq = self.semi_major * self.semi_major;
        (asq - self.semi_minor * self.semi_minor) / asq
    }

    /// 由北坐标求底点纬度（牛顿迭代）
    fn foot_point_latitude(&self, y: f64) -> f64 {
        let a = self.semi_major;
        let e2 = self.eccentricity_sq();
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let e8 = e6 * e2;

        let a0 = 1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0 - 175.0 * e8 / 16384.0;
        let a2 = 3.0 / 8.0 * (e2 + e4 / 4.0 + 15.0 * e6 / 128.0 - 455.0 * e8 / 4096.0);
        let a4 = 15.0 / 256.0 * (e4 + 3.0 * e6 / 4.0 - 77.0 * e8 / 128.0);
        let a6 = 35.0 / 3072.0 * (e6 - 41.0 * e8 / 32.0);
        let a8 = -315.0 * (e8 / 131072.0);

        let mut phi = y / a;
        for _ in 0..50 {
            let top = a
                * (a0 * phi - a2 * (2.0 * phi).sin() + a4 * (4.0 * phi).sin() - a6 * (6.0 * phi).sin()
                    + a8 * (8.0 * phi).sin())
                - y;
            let bot = a
                * (a0 - 2.0 * a2 * (2.0 * phi).cos() + 4.0 * a4 * (4.0 * phi).cos()
                    - 6.0 * a6 * (6.0 * phi).cos()
                    + 8.0 * a8 * (8.0 * phi).cos());
            let dphi = top / bot;
            phi -= dphi;
            if dphi.abs() <= 1e-13 {
                break;
            }
        }
        phi
    }

    /// 投影坐标反算纬度
    fn latitude(&self, p: &Point2) -> f64 {
        let a = self.semi_major;
        let asq = a * a;
        let bsq = self.semi_minor * self.semi_minor;
        let esq = self.eccentricity_sq();

        let x = (p.x - self.false_easting) / self.scale_factor;
        let y = p.y / self.scale_factor;
        let phi1 = self.foot_point_latitude(y);

        let t = phi1.tan();
        let sp = phi1.sin();
        let cpsq = phi1.cos().powi(2);
        let spsq = sp * sp;
        let eta2 = (asq - bsq) / bsq * cpsq;
        let eta4 = eta2 * eta2;
        let eta6 = eta4 * eta2;
        let eta8 = eta6 * eta2;
        let dn = a / (1.0 - esq * spsq).sqrt();
        let dm = a * (1.0 - esq) / (1.0 - esq * spsq).powf(1.5);

        let (t2, x2) = (t * t, x * x);
        let (t4, x4) = (t2 * t2, x2 * x2);
        let (t6, x6) = (t4 * t2, x4 * x2);

        phi1 - t * x2 / 2.0 / dm / dn
            + t * x4 / 24.0 / dm / dn.powi(3) * (5.0 + 3.0 * t2 - eta2 - 4.0 * eta4 - 9.0 * eta2 * t2)
            - t * x6 / 720.0 / dm / dn.powi(5)
                * (61.0 + 90.0 * t2 + 46.0 * eta2 + 45.0 * t4 - 252.0 * t2 * eta2 - 3.0 * eta4
                    + 100.0 * eta6
                    - 66.0 * t2 * eta4
                    - 90.0 * t4 * eta2
                    + 88.0 * eta8
                    + 225.0 * t4 * eta4
                    + 84.0 * t2 * eta6
                    - 192.0 * t2 * eta8)
            + t * (x / dn).powi(7) * x / 40320.0 / dm * (1385.0 + 3633.0 * t2 + 4095.0 * t4 + 1575.0 * t6)
    }
}

impl CoordinateSystem for TransverseMercator {
    fn name(&self) -> String {
        "Transverse Mercator".to_string()
    }

    fn line_scale_factor(&self, start: &Point2, end: &Point2) -> f64 {
        let phi = (self.latitude(start) + self.latitude(end)) * 0.5;
        let asq = self.semi_major * self.semi_major;
        let esq = self.eccentricity_sq();
        let sinphi = phi.sin();
        let fac = 1.0 - esq * sinphi * sinphi;
        let r2 = asq * (1.0 - esq) / (fac * fac);

        let x1 = start.x - self.false_easting;
        let x2 = end.x - self.false_easting;
        let xu2 = x1 * x1 + x1 * x2 + x2 * x2;
        self.scale_factor * (1.0 + xu2 / 6.0 / r2 * (1.0 + xu2 / 36.0 / r2))
    }
}

/// 可序列化的坐标系统配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinateSystemConfig {
    #[default]
    Plane,
    Constant {
        factor: f64,
    },
    TransverseMercator(TransverseMercator),
}

impl CoordinateSystemConfig {
    pub fn build(&self) -> Arc<dyn CoordinateSystem> {
        match self {
            CoordinateSystemConfig::Plane => Arc::new(PlaneSystem),
            CoordinateSystemConfig::Constant { factor } => Arc::new(ConstantScale { factor: *factor }),
            CoordinateSystemConfig::TransverseMercator(tm) => Arc::new(*tm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_is_unity() {
        let sys = PlaneSystem;
        assert_eq!(sys.line_scale_factor(&Point2::origin(), &Point2::new(100.0, 0.0)), 1.0);
    }

    #[test]
    fn test_tm_on_central_meridian() {
        let tm = TransverseMercator::default();
        let a = Point2::new(500_000.0, 5_500_000.0);
        let b = Point2::new(500_000.0, 5_501_000.0);
        let sfac = tm.line_scale_factor(&a, &b);
        assert!((sfac - 0.9996).abs() < 1e-9);
    }

    #[test]
    fn test_tm_grows_away_from_meridian() {
        let tm = TransverseMercator::default();
        let a = Point2::new(700_000.0, 5_500_000.0);
        let b = Point2::new(700_100.0, 5_500_100.0);
        let sfac = tm.line_scale_factor(&a, &b);
        // 距中央子午线约 200km，比例因子大于 1
        assert!(sfac > 1.0 && sfac < 1.001);
    }

    #[test]
    fn test_foot_point_latitude_equator() {
        let tm = TransverseMercator::default();
        assert!(tm.foot_point_latitude(0.0).abs() < 1e-12);
    }

    #[test]
    fn test_config_build() {
        let cfg: CoordinateSystemConfig = serde_json::from_str(r#"{"type":"constant","factor":0.5}"#).unwrap();
        let sys = cfg.build();
        assert_eq!(sys.line_scale_factor(&Point2::origin(), &Point2::new(1.0, 1.0)), 0.5);
    }
}
