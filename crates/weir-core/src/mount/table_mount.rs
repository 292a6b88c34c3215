//! The table mount adapter: expose a table as get / `put!` / `update!` /
//! `delete!` / `listener-stream` mount points.

use std::sync::Arc;

use crate::error::Error;
use crate::exec::{native_callback, CallbackOutput, Task};
use crate::mount::{MountAttr, MountPointSpec};
use crate::table::Table;
use crate::value::{Item, Value};

/// Options for mounting a table.
#[derive(Debug, Clone, Default)]
pub struct TableMountConfig {
    /// Skip the mutation points (`put!`, `update!`, `delete!`).
    pub readonly: bool,
    /// Extra required presence-only attrs (whitespace-separated), for
    /// namespacing the mounts.
    pub mount_as: Option<String>,
}

/// Build the mount points for a table.
///
/// Schema attrs become contract attrs: required unless configured
/// otherwise (generated attrs are never required), value-accepting, and
/// output-producing.
pub fn table_mount_points(table: &Arc<Table>, config: &TableMountConfig) -> Vec<MountPointSpec> {
    let schema = table.schema();

    let mut common: Vec<(String, MountAttr)> = Vec::new();
    for (attr, attr_config) in schema.attrs() {
        let required = attr_config.required.unwrap_or(true) && attr_config.generate.is_none();
        let mut mount_attr = MountAttr::new().accepts_value().output();
        if required {
            mount_attr = mount_attr.required();
        }
        common.push((attr.to_string(), mount_attr));
    }

    let mut mount_as: Vec<(String, MountAttr)> = Vec::new();
    for source in [schema.mount_as.as_deref(), config.mount_as.as_deref()]
        .into_iter()
        .flatten()
    {
        for token in source.split_whitespace() {
            mount_as.push((token.to_string(), MountAttr::new().required()));
        }
    }

    let base_spec = |extra: Option<&str>| {
        let mut spec = MountPointSpec::new();
        for (attr, mount_attr) in mount_as.iter().chain(common.iter()) {
            spec = spec.attr(attr.clone(), *mount_attr);
        }
        if let Some(extra) = extra {
            spec = spec.attr(extra, MountAttr::new().required());
        }
        spec
    };

    let mut points = Vec::new();

    // get
    {
        let table = table.clone();
        let mut spec = base_spec(None).with_callback(native_callback(move |task: &Task| {
            let filter = filter_from_task(&table, task, &[]);
            let items = if filter.is_empty() {
                table.scan()
            } else {
                table.where_filter(&filter)
            };
            Ok(CallbackOutput::Items(items))
        }));
        if let Some(name) = &schema.name {
            spec = spec.with_name(name.clone());
        }
        points.push(spec);
    }

    if !config.readonly {
        // put!
        {
            let table = table.clone();
            points.push(base_spec(Some("put!")).with_callback(native_callback(
                move |task: &Task| {
                    let mut item = Item::new();
                    for (attr, _) in table.schema().attrs() {
                        if task.has_value(attr) {
                            item.set(attr, task.get(attr)?);
                        }
                    }
                    table.put(item)?;
                    Ok(CallbackOutput::None)
                },
            )));
        }

        // update!
        {
            let table = table.clone();
            points.push(base_spec(Some("update!")).with_callback(native_callback(
                move |task: &Task| {
                    let body = match task.get("update!")? {
                        Value::Tuple(tuple) => tuple,
                        _ => {
                            return Err(Error::InvalidData(
                                "update! requires a tuple body".to_string(),
                            ))
                        }
                    };

                    let mut assignments: Vec<(String, Value)> = Vec::new();
                    for tag in body.tags() {
                        if tag.provides_value() {
                            assignments.push((tag.attr.clone(), tag.value.unwrap()?));
                        }
                    }

                    let filter = filter_from_task(&table, task, &["update!"]);
                    table.update(&filter, |item| {
                        for (attr, value) in &assignments {
                            item.set(attr.clone(), value.clone());
                        }
                    })?;
                    Ok(CallbackOutput::None)
                },
            )));
        }

        // delete!
        {
            let table = table.clone();
            points.push(base_spec(Some("delete!")).with_callback(native_callback(
                move |task: &Task| {
                    let filter = filter_from_task(&table, task, &["delete!"]);
                    table.delete(&filter)?;
                    Ok(CallbackOutput::None)
                },
            )));
        }
    }

    // listener-stream
    {
        let table = table.clone();
        points.push(base_spec(Some("listener-stream")).with_callback(native_callback(
            move |task: &Task| {
                let stream = table.start_listener_stream(true);
                task.graph()
                    .track_resource(&task.context().resource_tags, &stream);

                let mut item = Item::new();
                item.set("listener-stream", Value::Stream(stream));
                task.put(item)?;
                task.done();
                Ok(CallbackOutput::None)
            },
        )));
    }

    points
}

/// Build a row filter from the tuple's valued tags, limited to schema
/// attrs.
fn filter_from_task(table: &Table, task: &Task, exclude: &[&str]) -> Item {
    let mut filter = Item::new();
    for tag in task.tuple().tags() {
        if exclude.contains(&tag.attr.as_str()) {
            continue;
        }
        if table.schema().get_attr(&tag.attr).is_none() {
            continue;
        }
        if !tag.provides_value() {
            continue;
        }
        if let Ok(value) = tag.value.unwrap() {
            if !value.is_null() {
                filter.set(tag.attr.clone(), value);
            }
        }
    }
    filter
}
