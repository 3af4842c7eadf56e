// Cartesian Routing
//
// Combines the routes of several independently routed groups (sharding tables
// that are not bound together). Only data sources reached by every group
// survive; on each of them the units of all groups are crossed in group order.

use crate::route::context::RouteUnit;

pub fn combine(groups: &[Vec<RouteUnit>]) -> Vec<RouteUnit> {
    let Some((first, rest)) = groups.split_first() else {
        return Vec::new();
    };

    let mut data_sources: Vec<&str> = Vec::new();
    for unit in first {
        let ds = unit.data_source_name.as_str();
        if !data_sources.contains(&ds) && rest.iter().all(|g| g.iter().any(|u| u.data_source_name == ds)) {
            data_sources.push(ds);
        }
    }

    let mut result = Vec::new();
    for ds in data_sources {
        let mut partials: Vec<RouteUnit> = vec![RouteUnit::new(ds, Vec::new())];
        for group in groups {
            let on_ds: Vec<&RouteUnit> = group.iter().filter(|u| u.data_source_name == ds).collect();
            partials = partials
                .iter()
                .flat_map(|partial| {
                    on_ds.iter().map(move |unit| {
                        let mut combined = partial.clone();
                        for mapper in &unit.table_mappers {
                            combined.push_mapper(mapper.clone());
                        }
                        combined
                    })
                })
                .collect();
        }
        result.extend(partials);
    }
    result
}
