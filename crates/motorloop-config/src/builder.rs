//! 从配置构建调度器

use crate::error::ConfigError;
use crate::schema::{RobotConfig, UnitConfig};
use motorloop_backend::BackendFactory;
use motorloop_core::{MotorUnit, Scheduler, UnitId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// 构建结果
#[derive(Debug)]
pub struct BuiltRobot {
    pub scheduler: Scheduler,
    pub ids_by_name: HashMap<String, UnitId>,
}

impl BuiltRobot {
    pub fn id(&self, name: &str) -> Option<UnitId> {
        self.ids_by_name.get(name).copied()
    }
}

impl RobotConfig {
    /// 创建后端、注册单元、应用单元配置并建立跟随关系
    ///
    /// 单元按声明顺序注册；所有单元注册后再按声明顺序建立跟随关系。
    pub fn build(&self, factory: &dyn BackendFactory) -> Result<BuiltRobot, ConfigError> {
        self.check_names()?;

        let mut scheduler = Scheduler::new(self.control_loop.to_scheduler_config()?)?;
        let mut ids_by_name = HashMap::with_capacity(self.units.len());

        for unit_config in &self.units {
            let backend = factory
                .create(unit_config.vendor, unit_config.port)
                .map_err(|source| ConfigError::Backend {
                    unit: unit_config.name.clone(),
                    source,
                })?;
            let id = scheduler.add_boxed_unit(unit_config.name.clone(), backend);
            if let Some(unit) = scheduler.unit_mut(id) {
                configure_unit(unit, unit_config)?;
            }
            ids_by_name.insert(unit_config.name.clone(), id);
        }

        for unit_config in &self.units {
            let Some(master) = &unit_config.follow else {
                continue;
            };
            let (Some(&follower_id), Some(&master_id)) =
                (ids_by_name.get(&unit_config.name), ids_by_name.get(master))
            else {
                return Err(ConfigError::UnknownMaster {
                    unit: unit_config.name.clone(),
                    master: master.clone(),
                });
            };
            scheduler.follow(follower_id, master_id)?;
        }

        info!(
            "Built robot with {} units ({} followers)",
            self.units.len(),
            self.units.iter().filter(|u| u.follow.is_some()).count()
        );
        Ok(BuiltRobot {
            scheduler,
            ids_by_name,
        })
    }

    fn check_names(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::with_capacity(self.units.len());
        for unit in &self.units {
            if !seen.insert(unit.name.as_str()) {
                return Err(ConfigError::DuplicateName(unit.name.clone()));
            }
        }
        for unit in &self.units {
            if let Some(master) = &unit.follow
                && !seen.contains(master.as_str())
            {
                return Err(ConfigError::UnknownMaster {
                    unit: unit.name.clone(),
                    master: master.clone(),
                });
            }
        }
        Ok(())
    }
}

fn configure_unit(unit: &mut MotorUnit, config: &UnitConfig) -> Result<(), ConfigError> {
    // 先设置系数再反转编码器，反转后系数为负
    unit.set_conversion_factor(config.conversion_factor)?;
    if config.invert_encoder {
        unit.invert_encoder();
    }
    if config.invert_motor {
        unit.invert_motor();
    }
    if let Some(mode) = config.brake_mode {
        unit.set_brake_mode(mode)?;
    }
    if let Some(amps) = config.current_limit {
        unit.set_current_limit(amps)?;
    }
    if let Some(volts) = config.voltage_compensation {
        unit.set_voltage_compensation(volts)?;
    }
    for (slot, gains) in config.gains.slots() {
        unit.set_gains(slot, gains)?;
    }
    debug!("Configured unit '{}' ({}@{})", config.name, config.vendor, config.port);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use motorloop_backend::{SimFactory, SimPlant, Vendor};
    use motorloop_core::{ControlError, ControlMode};

    fn two_units() -> RobotConfig {
        let mut config = RobotConfig::default();
        config.units.push(UnitConfig::new("left", Vendor::TalonSrx, 1));
        config.units.push(UnitConfig::new("right", Vendor::TalonSrx, 2));
        config
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = two_units();
        config.units[1].name = "left".to_string();
        let factory = SimFactory::new(SimPlant::default());
        assert!(matches!(
            config.build(&factory),
            Err(ConfigError::DuplicateName(name)) if name == "left"
        ));
    }

    #[test]
    fn test_unknown_master_rejected() {
        let mut config = two_units();
        config.units[1].follow = Some("center".to_string());
        let factory = SimFactory::new(SimPlant::default());
        assert!(matches!(
            config.build(&factory),
            Err(ConfigError::UnknownMaster { .. })
        ));
    }

    #[test]
    fn test_follow_cycle_rejected() {
        let mut config = two_units();
        config.units[0].follow = Some("right".to_string());
        config.units[1].follow = Some("left".to_string());
        let factory = SimFactory::new(SimPlant::default());
        assert!(matches!(
            config.build(&factory),
            Err(ConfigError::Control(ControlError::FollowCycle { .. }))
        ));
    }

    #[test]
    fn test_build_applies_follow_and_inversion() {
        let mut config = two_units();
        config.units[0].conversion_factor = 2.0;
        config.units[0].invert_encoder = true;
        config.units[1].follow = Some("left".to_string());

        let factory = SimFactory::new(SimPlant::default());
        let robot = config.build(&factory).unwrap();
        let left = robot.id("left").unwrap();
        let right = robot.id("right").unwrap();

        assert_eq!(robot.scheduler.unit(left).unwrap().conversion_factor(), -2.0);
        assert_eq!(robot.scheduler.unit(right).unwrap().mode(), ControlMode::Follow);
        assert_eq!(robot.scheduler.unit(right).unwrap().master(), Some(left));
        assert_eq!(robot.scheduler.unit(left).unwrap().name(), "left");
    }
}
