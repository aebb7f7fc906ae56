//! # 实体定义测试

#[cfg(test)]
mod tests {
    use crate::{sso_credentials, sso_namespaces};
    use sea_orm::{EntityName, Set};

    #[tokio::test]
    async fn test_namespace_creation() {
        let namespace = sso_namespaces::ActiveModel {
            name: Set("githubTokens".to_string()),
            ..Default::default()
        };

        assert_eq!(namespace.name.as_ref(), "githubTokens");
        assert_eq!(sso_namespaces::Entity.table_name(), "sso_namespaces");
    }

    #[tokio::test]
    async fn test_credential_creation() {
        let credential = sso_credentials::ActiveModel {
            namespace: Set("redditTokens".to_string()),
            session_key: Set("k".repeat(48)),
            payload: Set(br#"{"provider":"reddit"}"#.to_vec()),
            ..Default::default()
        };

        assert_eq!(credential.namespace.as_ref(), "redditTokens");
        assert_eq!(credential.session_key.as_ref().len(), 48);
        assert_eq!(sso_credentials::Entity.table_name(), "sso_credentials");
    }
}
