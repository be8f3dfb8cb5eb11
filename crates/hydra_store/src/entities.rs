//! Typed views over the standard Hydra entities.

use std::ops::{Deref, DerefMut};

use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;

use hydra_core::{FieldValue, HydraError, HydraResult};

use crate::entity::Entity;
use crate::schema::Schema;

macro_rules! typed_entity {
    (
        $(#[$meta:meta])*
        $name:ident => $entity:literal $(, id = $id:literal)? {
            $( $getter:ident / $setter:ident : $kind:ident => $column:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        pub struct $name(Entity);

        impl $name {
            pub const ENTITY: &'static str = $entity;

            pub fn new(schema: &Schema) -> HydraResult<Self> {
                Entity::new(schema, $entity).map(Self)
            }

            pub fn from_entity(entity: Entity) -> HydraResult<Self> {
                if entity.entity_name() != $entity {
                    return Err(HydraError::validation(format!(
                        "expected a {} entity, got {}",
                        $entity,
                        entity.entity_name()
                    )));
                }
                Ok(Self(entity))
            }

            pub fn into_inner(self) -> Entity {
                self.0
            }

            $(
                pub async fn find<C: ConnectionTrait>(
                    schema: &Schema,
                    conn: &C,
                    id: i64,
                ) -> HydraResult<Option<Self>> {
                    let mut entity = Entity::new(schema, $entity)?;
                    entity.set($id, id)?;
                    Ok(entity.load(conn).await?.then_some(Self(entity)))
                }
            )?

            $( typed_entity!(@accessor $getter $setter $kind $column); )*
        }

        impl Deref for $name {
            type Target = Entity;

            fn deref(&self) -> &Entity {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Entity {
                &mut self.0
            }
        }
    };
    (@accessor $getter:ident $setter:ident text $column:literal) => {
        pub fn $getter(&self) -> HydraResult<Option<String>> {
            Ok(self.0.get($column)?.map(|value| match value {
                FieldValue::Text(text) => text,
                other => format!("{other:?}"),
            }))
        }

        pub fn $setter(&mut self, value: impl Into<String>) -> HydraResult<()> {
            self.0.set($column, value.into())
        }
    };
    (@accessor $getter:ident $setter:ident int $column:literal) => {
        pub fn $getter(&self) -> HydraResult<Option<i64>> {
            Ok(self.0.get($column)?.and_then(|value| value.as_i64()))
        }

        pub fn $setter(&mut self, value: i64) -> HydraResult<()> {
            self.0.set($column, value)
        }
    };
    (@accessor $getter:ident $setter:ident decimal $column:literal) => {
        pub fn $getter(&self) -> HydraResult<Option<Decimal>> {
            Ok(self.0.get($column)?.and_then(|value| value.as_decimal()))
        }

        pub fn $setter(&mut self, value: Decimal) -> HydraResult<()> {
            self.0.set($column, value)
        }
    };
}

typed_entity! {
    Project => "project", id = "project_id" {
        name / set_name: text => "project_name",
        description / set_description: text => "project_description",
        status / set_status: text => "status",
    }
}

typed_entity! {
    Network => "network", id = "network_id" {
        project_id / set_project_id: int => "project_id",
        name / set_name: text => "network_name",
        description / set_description: text => "network_description",
        layout / set_layout: text => "network_layout",
        status / set_status: text => "status",
    }
}

typed_entity! {
    Node => "node", id = "node_id" {
        network_id / set_network_id: int => "network_id",
        name / set_name: text => "node_name",
        description / set_description: text => "node_description",
        x / set_x: decimal => "node_x",
        y / set_y: decimal => "node_y",
        status / set_status: text => "status",
    }
}

typed_entity! {
    Link => "link", id = "link_id" {
        network_id / set_network_id: int => "network_id",
        node1_id / set_node1_id: int => "node1_id",
        node2_id / set_node2_id: int => "node2_id",
        name / set_name: text => "link_name",
        description / set_description: text => "link_description",
        status / set_status: text => "status",
    }
}

typed_entity! {
    ResourceGroup => "resource_group", id = "group_id" {
        network_id / set_network_id: int => "network_id",
        name / set_name: text => "group_name",
        description / set_description: text => "group_description",
        status / set_status: text => "status",
    }
}

typed_entity! {
    Scenario => "scenario", id = "scenario_id" {
        network_id / set_network_id: int => "network_id",
        name / set_name: text => "scenario_name",
        description / set_description: text => "scenario_description",
        start_time / set_start_time: text => "start_time",
        end_time / set_end_time: text => "end_time",
        time_step / set_time_step: text => "time_step",
        status / set_status: text => "status",
    }
}

typed_entity! {
    Attr => "attr", id = "attr_id" {
        name / set_name: text => "attr_name",
        dimension / set_dimension: text => "attr_dimen",
    }
}

typed_entity! {
    ResourceAttr => "resource_attr", id = "resource_attr_id" {
        attr_id / set_attr_id: int => "attr_id",
        ref_key / set_ref_key: text => "ref_key",
        network_id / set_network_id: int => "network_id",
        node_id / set_node_id: int => "node_id",
        link_id / set_link_id: int => "link_id",
        group_id / set_group_id: int => "group_id",
        attr_is_var / set_attr_is_var: text => "attr_is_var",
    }
}

typed_entity! {
    /// Binds a dataset to a resource attribute within a scenario.
    ResourceScenario => "resource_scenario" {
        scenario_id / set_scenario_id: int => "scenario_id",
        resource_attr_id / set_resource_attr_id: int => "resource_attr_id",
        dataset_id / set_dataset_id: int => "dataset_id",
    }
}

impl ResourceScenario {
    pub async fn find<C: ConnectionTrait>(
        schema: &Schema,
        conn: &C,
        scenario_id: i64,
        resource_attr_id: i64,
    ) -> HydraResult<Option<Self>> {
        let mut entity = Entity::new(schema, Self::ENTITY)?;
        entity.set("scenario_id", scenario_id)?;
        entity.set("resource_attr_id", resource_attr_id)?;
        Ok(entity.load(conn).await?.then_some(Self(entity)))
    }
}
