/// Environment variable holding the name of the currently executing function,
/// used as the target for self-reinvocation.
pub const SELF_FUNCTION_NAME: &str = "AWS_LAMBDA_FUNCTION_NAME";
/// Environment variable holding the region the handler itself runs in.
pub const CURRENT_REGION: &str = "AWS_REGION";
