//! # 凭据实体定义
//!
//! `(namespace, session_key)` 唯一，`payload` 为序列化后的会话记录

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 会话凭据
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sso_credentials")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub namespace: String,
    pub session_key: String,
    #[sea_orm(column_type = "Blob")]
    pub payload: Vec<u8>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sso_namespaces::Entity",
        from = "Column::Namespace",
        to = "super::sso_namespaces::Column::Name",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    SsoNamespace,
}

impl Related<super::sso_namespaces::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SsoNamespace.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
