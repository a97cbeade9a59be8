use indexmap::IndexMap;

use crate::auth::AuthContribution;
use crate::http::{DispatchRequest, Headers, Method, set_header};
use crate::model::{Collection, Endpoint, join_url, substitute_path_params};
use crate::script::ScriptRequest;
use crate::variable::{VariableContext, VariableProcessor};
use crate::{ResonanceError, Result};

/// 用当前变量集解析端点的全部模板字段
///
/// 返回的 URL 尚未替换路径参数、也未拼接查询参数，
/// 这样 pre-request 脚本修改 `pathParams` / `queryParams` 仍然有效。
pub fn resolve_endpoint(
    processor: &mut VariableProcessor,
    collection: &Collection,
    endpoint: &Endpoint,
    variables: &VariableContext,
) -> ScriptRequest {
    let base_url = processor.process_template(&collection.base_url, variables);
    let path = processor.process_template(&endpoint.path, variables);

    // collection 默认 header 在下，端点 header 覆盖
    let mut headers = Headers::new();
    for (key, value) in collection.headers.iter().chain(endpoint.headers.iter()) {
        let key = processor.process_template(key, variables);
        let value = processor.process_template(value, variables);
        set_header(&mut headers, &key, value);
    }

    let mut render_map = |map: &IndexMap<String, String>| -> IndexMap<String, String> {
        map.iter()
            .map(|(k, v)| {
                (
                    processor.process_template(k, variables),
                    processor.process_template(v, variables),
                )
            })
            .collect()
    };
    let query_params = render_map(&endpoint.query_params);
    let path_params = render_map(&endpoint.path_params);

    let body = endpoint
        .body
        .as_ref()
        .map(|body| processor.process_object(body, variables));

    ScriptRequest {
        url: join_url(&base_url, &path),
        method: endpoint.method.as_str().to_string(),
        headers,
        body,
        query_params,
        path_params,
    }
}

/// 合并认证贡献：header 覆盖同名项，查询参数追加
pub fn apply_auth(request: &mut ScriptRequest, contribution: &AuthContribution) {
    contribution.apply_headers(&mut request.headers);
    for (key, value) in &contribution.query {
        request.query_params.insert(key.clone(), value.clone());
    }
}

/// 生成最终 URL：替换路径参数并追加查询参数
pub fn finalize_url(request: &ScriptRequest) -> Result<String> {
    let url = substitute_path_params(&request.url, &request.path_params);
    if request.query_params.is_empty() {
        return Ok(url);
    }

    let mut parsed =
        url::Url::parse(&url).map_err(|e| ResonanceError::InvalidUrl(format!("{} ({})", url, e)))?;
    {
        let mut pairs = parsed.query_pairs_mut();
        for (key, value) in &request.query_params {
            pairs.append_pair(key, value);
        }
    }
    Ok(parsed.to_string())
}

/// 把（可能被脚本修改过的）请求转换为传输层请求
pub fn into_dispatch(request: &ScriptRequest) -> Result<DispatchRequest> {
    let method = Method::parse(&request.method)?;
    let url = finalize_url(request)?;

    Ok(DispatchRequest {
        method,
        url,
        headers: request.headers.clone(),
        body: request.body.clone(),
        timeout: None,
        proxy: None,
    })
}
