//! # 凭据分区实体定义
//!
//! 每个身份提供方一个分区（如 `githubTokens`），凭据写入前分区必须存在

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 凭据分区
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sso_namespaces")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sso_credentials::Entity")]
    SsoCredentials,
}

impl Related<super::sso_credentials::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SsoCredentials.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
