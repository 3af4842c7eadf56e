// Route Context
//
// Result of routing one statement: an ordered, de-duplicated set of route
// units, each naming one data source and the actual table every logical table
// maps to there.

use std::fmt;

use linked_hash_map::LinkedHashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    pub fn new(logic_name: &str, actual_name: &str) -> Self {
        Self { logic_name: logic_name.to_string(), actual_name: actual_name.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUnit {
    pub data_source_name: String,
    pub table_mappers: Vec<RouteMapper>,
}

impl RouteUnit {
    pub fn new(data_source_name: &str, table_mappers: Vec<RouteMapper>) -> Self {
        Self { data_source_name: data_source_name.to_string(), table_mappers }
    }

    pub fn find_actual_table(&self, logic_table: &str) -> Option<&str> {
        self.table_mappers
            .iter()
            .find(|m| m.logic_name.eq_ignore_ascii_case(logic_table))
            .map(|m| m.actual_name.as_str())
    }

    pub fn logic_table_names(&self) -> impl Iterator<Item = &str> {
        self.table_mappers.iter().map(|m| m.logic_name.as_str())
    }

    /// Add a mapping unless the logical table is already mapped.
    pub fn push_mapper(&mut self, mapper: RouteMapper) {
        if self.find_actual_table(&mapper.logic_name).is_none() {
            self.table_mappers.push(mapper);
        }
    }

    fn identity(&self) -> (String, Vec<RouteMapper>) {
        let mut mappers = self.table_mappers.clone();
        mappers.sort_by(|a, b| a.logic_name.cmp(&b.logic_name).then(a.actual_name.cmp(&b.actual_name)));
        (self.data_source_name.clone(), mappers)
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.data_source_name)?;
        for (i, mapper) in self.table_mappers.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}->{}", sep, mapper.logic_name, mapper.actual_name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    units: LinkedHashMap<(String, Vec<RouteMapper>), RouteUnit>,
}

impl RouteContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_units(units: impl IntoIterator<Item = RouteUnit>) -> Self {
        let mut context = Self::new();
        for unit in units {
            context.add_unit(unit);
        }
        context
    }

    /// Returns false when an identical unit is already present.
    pub fn add_unit(&mut self, unit: RouteUnit) -> bool {
        let key = unit.identity();
        if self.units.contains_key(&key) {
            return false;
        }
        self.units.insert(key, unit);
        true
    }

    pub fn route_units(&self) -> impl Iterator<Item = &RouteUnit> {
        self.units.values()
    }

    pub fn into_route_units(self) -> Vec<RouteUnit> {
        self.units.into_iter().map(|(_, unit)| unit).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Distinct data sources in route order
    pub fn data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in self.units.values() {
            if !names.contains(&unit.data_source_name.as_str()) {
                names.push(&unit.data_source_name);
            }
        }
        names
    }

    /// Distinct actual tables of `logic_table` in route order
    pub fn actual_tables(&self, logic_table: &str) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for actual in self.units.values().filter_map(|u| u.find_actual_table(logic_table)) {
            if !tables.contains(&actual) {
                tables.push(actual);
            }
        }
        tables
    }

    pub(crate) fn retain<F: FnMut(&RouteUnit) -> bool>(&mut self, mut keep: F) {
        let kept: Vec<RouteUnit> = std::mem::take(&mut self.units)
            .into_iter()
            .map(|(_, unit)| unit)
            .filter(|unit| keep(unit))
            .collect();
        for unit in kept {
            self.add_unit(unit);
        }
    }

    pub(crate) fn map_units<F: FnMut(&mut RouteUnit)>(&mut self, mut update: F) {
        let units: Vec<RouteUnit> = std::mem::take(&mut self.units).into_iter().map(|(_, unit)| unit).collect();
        for mut unit in units {
            update(&mut unit);
            self.add_unit(unit);
        }
    }
}
