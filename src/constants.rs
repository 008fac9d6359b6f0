pub const KUBECONFIG: &str = "KUBECONFIG";

// .env keys written at init
pub const OCP_API_URL: &str = "OCP_API_URL";
pub const OCP_CONSOLE_URL: &str = "OCP_CONSOLE_URL";
pub const OCP_USERNAME: &str = "OCP_USERNAME";
pub const OCP_PASSWORD: &str = "OCP_PASSWORD";
pub const OCP_TOKEN: &str = "OCP_TOKEN";
pub const AAP_URL: &str = "AAP_URL";
pub const AAP_USERNAME: &str = "AAP_USERNAME";
pub const AAP_PASSWORD: &str = "AAP_PASSWORD";
pub const AAP_TOKEN: &str = "AAP_TOKEN";
pub const WORKSHOP_GUID: &str = "WORKSHOP_GUID";
pub const WORKSHOP_NAMESPACE: &str = "WORKSHOP_NAMESPACE";
pub const MAINFRAME_HOST: &str = "MAINFRAME_HOST";

// .env keys appended while configuring the controller
pub const AAP_ORGANIZATION_ID: &str = "AAP_ORGANIZATION_ID";
pub const AAP_PROJECT_ID: &str = "AAP_PROJECT_ID";
pub const AAP_INVENTORY_ID: &str = "AAP_INVENTORY_ID";
pub const AAP_HOST_ID: &str = "AAP_HOST_ID";
pub const AAP_CREDENTIAL_ID: &str = "AAP_CREDENTIAL_ID";
pub const AAP_EE_ID: &str = "AAP_EE_ID";
pub const AAP_JOB_TEMPLATE_ID_PREFIX: &str = "AAP_JOB_TEMPLATE_";

pub const AAP_API_PREFIX: &str = "/api/controller/v2";
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const TCP_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const LABEL_WORKSHOP_GUID: &str = "workshop/guid";
pub const LABEL_WORKSHOP_ENVIRONMENT: &str = "workshop/environment";

pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_ENVIRONMENT: &str = "dev";
pub const DEFAULT_MAINFRAME_PORT: u16 = 443;
pub const WORKSPACE_DIR: &str = ".workshop-workspace";
